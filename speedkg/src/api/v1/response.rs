//! # V1 response envelope
//!
//! Every v1 endpoint returns an [`ApiResponse<T>`] with exactly one of two
//! top-level fields:
//!
//! ```json
//! { "data": { ... } }
//! { "error": { "code": "invalid_request", "message": "..." } }
//! ```
//!
//! A question that reaches the pipeline always yields `data`, including when
//! the pipeline itself ended in a failure; that failure is described by the
//! `status` and `error` fields of the returned `QueryResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::KgError;

const INTERNAL_MESSAGE: &str = "Internal server error";
const UPSTREAM_MESSAGE: &str = "Upstream service error";

/// Machine-readable error code, serialized as snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// HTTP 400.
    InvalidRequest,
    /// The graph store refused the query. HTTP 422.
    QueryRejected,
    /// HTTP 429.
    RateLimited,
    /// Internal details are never leaked. HTTP 500.
    InternalError,
    /// The model service or another upstream returned an error. HTTP 502.
    UpstreamError,
    /// HTTP 503.
    Unavailable,
    /// HTTP 504.
    Timeout,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::QueryRejected => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Safe to show to end users.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    /// Not serialized on the wire.
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    /// Error response; the HTTP status comes from the [`ErrorCode`].
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status: code.status(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        // Payload serialization can fail; the bare error envelope cannot.
        serde_json::to_value(&self)
            .map(|body| (status, Json(body)).into_response())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Response body could not be serialized");
                let fallback = ApiResponse::<()>::error(ErrorCode::InternalError, INTERNAL_MESSAGE);
                (fallback.status, Json(fallback)).into_response()
            })
    }
}

impl<T: Serialize> From<KgError> for ApiResponse<T> {
    fn from(err: KgError) -> Self {
        match err {
            KgError::Validation(msg) => ApiResponse::error(ErrorCode::InvalidRequest, msg),
            KgError::Json(e) => {
                ApiResponse::error(ErrorCode::InvalidRequest, format!("Invalid JSON: {e}"))
            }
            KgError::QueryRejected(msg) => ApiResponse::error(ErrorCode::QueryRejected, msg),
            KgError::GraphUnavailable(msg) | KgError::LlmUnavailable(msg) => {
                ApiResponse::error(ErrorCode::Unavailable, msg)
            }
            ref timeout @ (KgError::GraphTimeout(_) | KgError::LlmTimeout(_)) => {
                ApiResponse::error(ErrorCode::Timeout, timeout.to_string())
            }
            KgError::LlmRateLimit { retry_after } => {
                let msg = match retry_after {
                    Some(secs) => format!("Rate limit exceeded, retry after {secs} seconds"),
                    None => "Rate limit exceeded".to_string(),
                };
                ApiResponse::error(ErrorCode::RateLimited, msg)
            }
            ref upstream @ (KgError::Llm(_) | KgError::Http(_)) => {
                tracing::warn!(error = %upstream, "Upstream failure returned to client");
                ApiResponse::error(ErrorCode::UpstreamError, UPSTREAM_MESSAGE)
            }
            ref internal @ (KgError::GraphDecode(_) | KgError::Io(_) | KgError::Internal(_)) => {
                tracing::error!(error = %internal, "Internal failure returned to client");
                ApiResponse::error(ErrorCode::InternalError, INTERNAL_MESSAGE)
            }
        }
    }
}
