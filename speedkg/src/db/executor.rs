use std::sync::Arc;
use std::time::Duration;

use crate::db::traits::GraphStore;
use crate::error::{KgError, Result};
use crate::models::{GraphQuery, ResultRow};

/// Runs validated query text against the store under a timeout.
///
/// Single attempt; the caller decides what a retryable failure means.
#[derive(Clone)]
pub struct GraphExecutor {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl GraphExecutor {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, text: &str) -> Result<Vec<ResultRow>> {
        self.run(&GraphQuery::new(text)).await
    }

    pub async fn run(&self, query: &GraphQuery) -> Result<Vec<ResultRow>> {
        match tokio::time::timeout(self.timeout, self.store.run(query)).await {
            Ok(result) => result,
            Err(_) => Err(KgError::GraphTimeout(self.timeout)),
        }
    }
}
