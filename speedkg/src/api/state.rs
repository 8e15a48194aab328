use std::sync::Arc;

use crate::config::Config;
use crate::db::GraphStore;
use crate::llm::{LanguageModel, LlmBackend, LlmProvider};
use crate::services::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn GraphStore>,
    pub llm: Arc<dyn LanguageModel>,
    /// Set when the model is the configured [`LlmProvider`]; reported by health.
    pub llm_backend: Option<LlmBackend>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn GraphStore>, llm: LlmProvider) -> Self {
        let backend = llm.backend().clone();
        let mut state = Self::with_model(config, store, Arc::new(llm));
        state.llm_backend = Some(backend);
        state
    }

    /// Build state around any [`LanguageModel`], e.g. an in-process fake.
    pub fn with_model(
        config: Config,
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let pipeline = Pipeline::new(llm.clone(), store.clone(), &config);
        Self {
            config: Arc::new(config),
            store,
            llm,
            llm_backend: None,
            pipeline,
        }
    }
}
