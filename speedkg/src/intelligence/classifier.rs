use std::sync::Arc;

use crate::error::{KgError, Result};
use crate::llm::{prompts, CompletionRequest, LanguageModel, TokenUsage};
use crate::models::{Classification, Intent};

/// Confidence assumed when the model names an intent but omits a score.
pub const DEFAULT_REPORTED_CONFIDENCE: f32 = 0.8;

/// Maps a question onto the closed [`Intent`] set via the model service.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    /// Returns the model's classification or an error; substituting the
    /// fallback intent is left to the caller.
    pub async fn classify(&self, question: &str) -> Result<(Classification, TokenUsage)> {
        let request = CompletionRequest::new(
            prompts::intent_system_prompt(),
            question,
            self.max_tokens,
        );
        let completion = self.llm.complete(&request).await?;
        tracing::debug!(response = %completion.text, "Intent classification response");

        let classification = parse_classification(&completion.text)?;
        Ok((classification, completion.usage))
    }
}

/// Parse a two-line `intent: <label>` / `confidence: <score>` reply.
///
/// A missing or unreadable confidence becomes [`DEFAULT_REPORTED_CONFIDENCE`];
/// a missing or unknown intent is an error.
pub fn parse_classification(text: &str) -> Result<Classification> {
    let mut intent_label: Option<String> = None;
    let mut confidence = DEFAULT_REPORTED_CONFIDENCE;

    for line in text.lines() {
        let line = line.trim().trim_matches('*').trim().to_lowercase();
        let line = line.replace("**", "");

        if let Some(rest) = line.strip_prefix("intent:") {
            intent_label = Some(rest.trim().trim_matches(|c| c == '*' || c == '`').to_string());
        } else if let Some(rest) = line.strip_prefix("confidence:") {
            match rest.trim().parse::<f32>() {
                Ok(value) => confidence = value,
                Err(_) => tracing::warn!(line = %line, "Could not parse confidence"),
            }
        }
    }

    let label = intent_label
        .filter(|label| !label.is_empty())
        .ok_or_else(|| KgError::Llm("No intent found in classifier response".to_string()))?;

    let intent: Intent = label.parse().map_err(KgError::Llm)?;

    Ok(Classification::new(intent, confidence))
}
