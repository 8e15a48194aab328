mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{event_row, init_test_logger, FakeGraphStore, ScriptedModel};
use speedkg::api::{create_router, AppState};
use speedkg::config::Config;

fn app(store: FakeGraphStore, llm: ScriptedModel) -> axum::Router {
    create_router(AppState::with_model(
        Config::default(),
        Arc::new(store),
        Arc::new(llm),
    ))
}

fn year_model() -> ScriptedModel {
    ScriptedModel::new(
        "temporal_analysis",
        "MATCH (e:Event) WHERE e.year = 1950 RETURN e.eventId",
        "EID1 occurred in 1950.",
    )
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_query(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_health() -> Request<Body> {
    Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn test_health_reports_reachable_dependencies() {
    init_test_logger();
    let (status, body) = send(app(FakeGraphStore::new(Vec::new()), year_model()), get_health()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["graph"]["status"], "ok");
    assert_eq!(body["data"]["llm"]["status"], "available");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_health_is_degraded_when_graph_is_down() {
    let store = FakeGraphStore::new(Vec::new()).unhealthy();
    let (status, body) = send(app(store, year_model()), get_health()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "degraded");
    assert_eq!(body["data"]["graph"]["status"], "error");
}

#[tokio::test]
async fn test_query_returns_full_response_in_envelope() {
    init_test_logger();
    let store = FakeGraphStore::new(vec![event_row("EID1", 1950)]);
    let request = post_query(json!({
        "question": "What events occurred in 1950?",
        "sessionId": "session-42"
    }));

    let (status, body) = send(app(store, year_model()), request).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["status"], "completed");
    assert_eq!(data["sessionId"], "session-42");
    assert_eq!(data["intent"], "temporal_analysis");
    assert_eq!(data["citations"], json!(["EID1"]));
    assert_eq!(data["resultRowCount"], 1);
    assert_eq!(data["trace"].as_array().map(Vec::len), Some(8));
    assert!(data["requestId"].is_string());
}

#[tokio::test]
async fn test_pipeline_failure_is_reported_in_data() {
    let llm = ScriptedModel::new("pattern_analysis", "MATCH (n) DETACH DELETE n", "unused");
    let store = FakeGraphStore::new(Vec::new());

    let (status, body) = send(app(store, llm), post_query(json!({ "question": "Wipe it" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["error"]["kind"], "security_violation");
    assert_eq!(body["data"]["error"]["stage"], "validate");
    assert!(body["data"]["answer"].is_null());
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let (status, body) = send(
        app(FakeGraphStore::new(Vec::new()), year_model()),
        post_query(json!({ "question": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_missing_question_field_is_rejected_in_envelope() {
    let (status, body) = send(
        app(FakeGraphStore::new(Vec::new()), year_model()),
        post_query(json!({ "sessionId": "s" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("question"), "{message}");
}
