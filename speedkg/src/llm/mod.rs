mod api;
pub mod prompts;
mod provider;

pub use api::LlmApiClient;
pub use provider::{
    Completion, CompletionRequest, LanguageModel, LlmBackend, LlmProvider, TokenUsage,
};
