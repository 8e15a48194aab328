use axum::extract::State;

use crate::api::v1::dto::QueryRequest;
use crate::api::v1::response::{ApiResponse, ErrorCode};
use crate::api::{AppJson, AppState};
use crate::models::{QueryResponse, Question};

/// `POST /api/v1/query`
pub async fn ask(
    State(state): State<AppState>,
    AppJson(req): AppJson<QueryRequest>,
) -> ApiResponse<QueryResponse> {
    let question = req.question.trim();
    if question.is_empty() {
        return ApiResponse::error(ErrorCode::InvalidRequest, "Question cannot be empty");
    }

    let session_id = req.session_id.filter(|s| !s.trim().is_empty());
    let response = state
        .pipeline
        .query(Question::new(question, session_id))
        .await;

    ApiResponse::success(response)
}
