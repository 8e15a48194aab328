use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    /// Correlation id echoed back in the response and logs.
    #[serde(default)]
    pub session_id: Option<String>,
}
