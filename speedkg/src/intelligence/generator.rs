use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{KgError, Result};
use crate::llm::prompts::{self, WorkedExample};
use crate::llm::{CompletionRequest, LanguageModel, TokenUsage};
use crate::models::{GeneratedQuery, Intent};

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").expect("valid regex"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("valid regex"));

/// Turns a question and its intent into Cypher text.
///
/// Performs no safety checks of its own; the output must go through
/// [`QueryValidator`](super::QueryValidator) before execution.
#[derive(Clone)]
pub struct QueryGenerator {
    llm: Arc<dyn LanguageModel>,
    schema_description: String,
    examples: Vec<WorkedExample>,
    max_tokens: u32,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, max_tokens: u32) -> Self {
        Self::with_context(
            llm,
            prompts::SCHEMA_DESCRIPTION,
            prompts::WORKED_EXAMPLES,
            max_tokens,
        )
    }

    pub fn with_context(
        llm: Arc<dyn LanguageModel>,
        schema_description: &str,
        examples: &[WorkedExample],
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            schema_description: schema_description.to_string(),
            examples: examples.to_vec(),
            max_tokens,
        }
    }

    /// Single model call; failures are returned unchanged.
    pub async fn generate(
        &self,
        question: &str,
        intent: Intent,
    ) -> Result<(GeneratedQuery, TokenUsage)> {
        let request = CompletionRequest::new(
            prompts::query_generation_prompt(&self.schema_description, &self.examples, intent),
            prompts::query_generation_user_message(question),
            self.max_tokens,
        );

        let completion = self.llm.complete(&request).await?;
        let text = strip_code_fences(&completion.text);
        if text.is_empty() {
            return Err(KgError::Llm("Model returned an empty query".to_string()));
        }

        tracing::debug!(query = %text, "Generated query");
        Ok((GeneratedQuery::unvalidated(text), completion.usage))
    }
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = OPENING_FENCE.replace(trimmed, "");
    let without_close = CLOSING_FENCE.replace(&without_open, "");
    without_close.trim().to_string()
}
