use async_trait::async_trait;

use crate::error::Result;
use crate::models::{GraphQuery, ResultRow};

/// Read access to the event graph.
///
/// Implementations return rows in the order the store produced them and keep
/// each row's columns in projection order.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run(&self, query: &GraphQuery) -> Result<Vec<ResultRow>>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;
}
