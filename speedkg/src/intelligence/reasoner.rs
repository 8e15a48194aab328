use std::sync::Arc;

use crate::error::Result;
use crate::intelligence::citations::extract_citations;
use crate::llm::{prompts, CompletionRequest, LanguageModel, TokenUsage};

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonedAnswer {
    pub answer: String,
    pub citations: Vec<String>,
    pub usage: TokenUsage,
}

/// Produces the grounded final answer from serialized graph context.
#[derive(Clone)]
pub struct Reasoner {
    llm: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn LanguageModel>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    pub async fn reason(
        &self,
        question: &str,
        context: &str,
        query: Option<&str>,
    ) -> Result<ReasonedAnswer> {
        let request = CompletionRequest::new(
            prompts::REASONING_SYSTEM_PROMPT,
            prompts::reasoning_user_message(question, context, query),
            self.max_tokens,
        );

        let completion = self.llm.complete(&request).await?;
        let answer = completion.text.trim().to_string();
        let citations = extract_citations(&answer);

        tracing::info!(
            tokens = completion.usage.total(),
            citations = citations.len(),
            "Reasoning complete"
        );

        Ok(ReasonedAnswer {
            answer,
            citations,
            usage: completion.usage,
        })
    }
}
