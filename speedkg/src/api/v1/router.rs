use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::api::AppState;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/query", post(handlers::query::ask))
}
