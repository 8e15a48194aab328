use std::time::Duration;

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::v1::response::ApiResponse;

#[derive(Error, Debug)]
pub enum KgError {
    #[error("Graph store unavailable: {0}")]
    GraphUnavailable(String),

    #[error("Graph query timed out after {0:?}")]
    GraphTimeout(Duration),

    #[error("Query rejected by graph store: {0}")]
    QueryRejected(String),

    #[error("Failed to decode graph result: {0}")]
    GraphDecode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KgError {
    /// Connectivity and timeout failures may succeed on a later attempt;
    /// a query the store refused will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KgError::GraphUnavailable(_)
                | KgError::GraphTimeout(_)
                | KgError::LlmRateLimit { .. }
                | KgError::LlmTimeout(_)
                | KgError::Http(_)
        )
    }
}

/// Renders in the v1 `{ "error": { code, message } }` envelope.
impl IntoResponse for KgError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::from(self).into_response()
    }
}

pub type Result<T> = std::result::Result<T, KgError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_connectivity_errors_are_retryable() {
        assert!(KgError::GraphUnavailable("refused".into()).is_retryable());
        assert!(KgError::GraphTimeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_store_rejection_is_not_retryable() {
        assert!(!KgError::QueryRejected("SyntaxError".into()).is_retryable());
        assert!(!KgError::Llm("bad request".into()).is_retryable());
    }

    #[test]
    fn test_into_response_status_mapping() {
        let response = KgError::QueryRejected("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = KgError::LlmUnavailable("none".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
