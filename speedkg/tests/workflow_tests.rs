mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{
    actor_node, edge, event_node, event_row, expansion_row, init_test_logger, pipeline,
    pipeline_with_timeout, FakeGraphStore, Reply, ScriptedModel,
};
use speedkg::models::{ErrorKind, Intent, QueryStatus, Question, WorkflowStage};

const YEAR_QUERY: &str = "MATCH (e:Event) WHERE e.year = 1950 RETURN e.eventId, e.year";
const ACTOR_QUERY: &str =
    "MATCH (e:Event)-[:INITIATED_BY]->(a:Actor {name: 'Hamas'}) RETURN e.eventId, e.year";

fn stages(response: &speedkg::models::QueryResponse) -> Vec<WorkflowStage> {
    response.trace.steps().iter().map(|s| s.step).collect()
}

#[tokio::test]
async fn test_temporal_question_is_limited_and_not_expanded() {
    init_test_logger();
    let llm = Arc::new(ScriptedModel::new(
        "temporal_analysis",
        YEAR_QUERY,
        "Two events occurred in 1950: EID1 and EID2.",
    ));
    let store = Arc::new(FakeGraphStore::new(vec![
        event_row("EID1", 1950),
        event_row("EID2", 1950),
    ]));

    let response = pipeline(llm.clone(), store.clone())
        .query(Question::new("What events occurred in 1950?", None))
        .await;

    assert_eq!(response.status, QueryStatus::Completed);
    assert_eq!(response.intent, Some(Intent::TemporalAnalysis));
    let query = response.generated_query.as_deref().unwrap_or_default();
    assert!(query.contains("e.year = 1950"));
    assert!(query.ends_with("LIMIT 100"), "{query}");

    // aggregation-only strategy: the primary query is the only store call
    assert_eq!(store.run_calls(), 1);
    assert_eq!(store.recorded()[0].text, query);
    assert_eq!(response.result_row_count, 2);
    assert_eq!(response.citations, vec!["EID1", "EID2"]);
    assert_eq!(response.total_tokens, 45);
    assert_eq!(llm.calls(), (1, 1, 1));

    assert_eq!(
        stages(&response),
        vec![
            WorkflowStage::ParseIntent,
            WorkflowStage::GenerateQuery,
            WorkflowStage::Validate,
            WorkflowStage::ExecuteQuery,
            WorkflowStage::ExpandSubgraph,
            WorkflowStage::Serialize,
            WorkflowStage::Reason,
            WorkflowStage::Complete,
        ]
    );
    assert!(response.trace.steps().iter().all(|s| s.success));
}

#[tokio::test]
async fn test_destructive_query_never_reaches_the_store() {
    init_test_logger();
    let llm = Arc::new(ScriptedModel::new(
        "pattern_analysis",
        "MATCH (n) DETACH DELETE n",
        "unused",
    ));
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    let response = pipeline(llm.clone(), store.clone())
        .query(Question::new("Remove everything", None))
        .await;

    assert_eq!(response.status, QueryStatus::Failed);
    assert!(response.answer.is_none());
    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::SecurityViolation);
    assert_eq!(failure.stage, WorkflowStage::Validate);
    assert!(failure.message.contains("DELETE"));
    assert_eq!(store.run_calls(), 0);
    assert_eq!(llm.calls(), (1, 1, 0));

    let last = response.trace.last().expect("terminal step");
    assert_eq!(last.step, WorkflowStage::Error);
    assert!(!last.success);
}

#[tokio::test]
async fn test_actor_question_expands_over_participant_edges() {
    init_test_logger();
    let llm = Arc::new(ScriptedModel::new(
        "actor_analysis",
        ACTOR_QUERY,
        "Hamas initiated EID1.",
    ));
    let store = Arc::new(
        FakeGraphStore::new(vec![event_row("EID1", 1950)]).expansion_with(Reply::Ok(vec![
            expansion_row(
                json!([
                    event_node("n1", "EID1"),
                    actor_node("n2", "Hamas"),
                    event_node("n3", "EID9"),
                ]),
                json!([
                    edge("r1", "INITIATED_BY", "n1", "n2"),
                    edge("r2", "LINKED_TO", "n1", "n3"),
                ]),
            ),
        ])),
    );

    let response = pipeline(llm, store.clone())
        .query(Question::new("What has Hamas done?", None))
        .await;

    assert_eq!(response.status, QueryStatus::Completed);
    assert_eq!(response.intent, Some(Intent::ActorAnalysis));

    let queries = store.recorded();
    assert_eq!(queries.len(), 2);
    let expansion = &queries[1];
    assert!(expansion
        .text
        .contains("[:INITIATED_BY|TARGETED|VICTIMIZED*0..2]"));
    assert!(expansion.text.contains("LIMIT 500"));
    assert_eq!(expansion.params["seeds"], json!(["EID1"]));

    // LINKED_TO is outside the actor strategy, so EID9 is unreachable
    assert_eq!(response.subgraph_node_count, 2);
    assert_eq!(response.subgraph_edge_count, 1);
}

#[tokio::test]
async fn test_generation_failure_records_one_failed_step() {
    init_test_logger();
    let llm = Arc::new(
        ScriptedModel::new("single_event", "", "unused")
            .generate_with(Reply::Fail("model overloaded".to_string())),
    );
    let store = Arc::new(FakeGraphStore::new(Vec::new()));

    let response = pipeline(llm, store.clone())
        .query(Question::new("Tell me about EID5", None))
        .await;

    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::GenerationFailure);
    assert_eq!(failure.stage, WorkflowStage::GenerateQuery);

    let generate_steps: Vec<_> = response
        .trace
        .for_stage(WorkflowStage::GenerateQuery)
        .collect();
    assert_eq!(generate_steps.len(), 1);
    assert!(!generate_steps[0].success);
    assert_eq!(
        stages(&response),
        vec![
            WorkflowStage::ParseIntent,
            WorkflowStage::GenerateQuery,
            WorkflowStage::Error,
        ]
    );
    assert_eq!(store.run_calls(), 0);
}

#[tokio::test]
async fn test_classification_failure_falls_back_and_continues() {
    init_test_logger();
    let llm = Arc::new(
        ScriptedModel::new("unused", YEAR_QUERY, "EID1 happened.")
            .classify_with(Reply::Fail("bad gateway".to_string())),
    );
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    let response = pipeline(llm, store)
        .query(Question::new("Which patterns stand out?", None))
        .await;

    assert_eq!(response.status, QueryStatus::Completed);
    assert_eq!(response.intent, Some(Intent::PatternAnalysis));
    assert_eq!(response.intent_confidence, Some(0.5));

    let parse = response
        .trace
        .for_stage(WorkflowStage::ParseIntent)
        .next()
        .expect("parse step");
    assert!(!parse.success);
    assert_eq!(parse.details["fallback"], json!(true));
}

#[tokio::test]
async fn test_unparseable_classification_also_falls_back() {
    let llm = Arc::new(
        ScriptedModel::new("unused", YEAR_QUERY, "EID1.")
            .classify_with(Reply::Ok("I think this is about history".to_string())),
    );
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    let response = pipeline(llm, store)
        .query(Question::new("Hmm?", None))
        .await;

    assert!(response.is_success());
    assert_eq!(response.intent, Some(Intent::PatternAnalysis));
}

#[tokio::test]
async fn test_store_rejection_is_an_execution_failure() {
    init_test_logger();
    let llm = Arc::new(ScriptedModel::new("single_event", YEAR_QUERY, "unused"));
    let store = Arc::new(
        FakeGraphStore::new(Vec::new())
            .primary_with(Reply::Fail("SyntaxError: Invalid input".to_string())),
    );

    let response = pipeline(llm.clone(), store)
        .query(Question::new("What happened in 1950?", None))
        .await;

    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::ExecutionFailure);
    let execute = response
        .trace
        .for_stage(WorkflowStage::ExecuteQuery)
        .next()
        .expect("execute step");
    assert_eq!(execute.details["retryable"], json!(false));
    assert_eq!(llm.calls(), (1, 1, 0));
}

#[tokio::test]
async fn test_expansion_failure_degrades_to_rows_only() {
    init_test_logger();
    let llm = Arc::new(ScriptedModel::new("actor_analysis", ACTOR_QUERY, "EID1."));
    let store = Arc::new(
        FakeGraphStore::new(vec![event_row("EID1", 1950)])
            .expansion_with(Reply::Fail("Neo.TransientError".to_string())),
    );

    let response = pipeline(llm, store)
        .query(Question::new("What has Hamas done?", None))
        .await;

    assert_eq!(response.status, QueryStatus::Completed);
    assert_eq!(response.subgraph_node_count, 0);
    let expand = response
        .trace
        .for_stage(WorkflowStage::ExpandSubgraph)
        .next()
        .expect("expand step");
    assert!(!expand.success);
    assert_eq!(expand.details["degraded"], json!(true));
}

#[tokio::test]
async fn test_reasoning_failure_keeps_partial_trace() {
    init_test_logger();
    let llm = Arc::new(
        ScriptedModel::new("temporal_analysis", YEAR_QUERY, "unused")
            .reason_with(Reply::Fail("context length exceeded".to_string())),
    );
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    let response = pipeline(llm, store)
        .query(Question::new("What events occurred in 1950?", None))
        .await;

    assert_eq!(response.status, QueryStatus::Failed);
    assert!(response.answer.is_none());
    assert_eq!(response.result_row_count, 1);
    assert!(response.generated_query.is_some());
    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::ReasoningFailure);
    assert_eq!(failure.stage, WorkflowStage::Reason);
    // parse, generate, validate, execute, expand, serialize, reason, error
    assert_eq!(response.trace.len(), 8);
}

#[tokio::test]
async fn test_reasoning_prompt_carries_context_and_query() {
    let llm = Arc::new(ScriptedModel::new("temporal_analysis", YEAR_QUERY, "EID1."));
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    pipeline(llm.clone(), store)
        .query(Question::new("What events occurred in 1950?", None))
        .await;

    let requests = llm.reason_requests.lock().expect("lock");
    let user = &requests[0].user;
    assert!(user.contains("What events occurred in 1950?"));
    assert!(user.contains("EID1"));
    assert!(user.contains("e.year = 1950"));
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_abandons_hung_call() {
    init_test_logger();
    let llm = Arc::new(
        ScriptedModel::new("temporal_analysis", YEAR_QUERY, "unused").reason_with(Reply::Hang),
    );
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));

    let response = pipeline_with_timeout(llm, store, 5)
        .query(Question::new("What events occurred in 1950?", None))
        .await;

    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.stage, WorkflowStage::Reason);
    assert_eq!(response.trace.last().map(|s| s.step), Some(WorkflowStage::Error));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_in_flight_call() {
    init_test_logger();
    let llm = Arc::new(
        ScriptedModel::new("single_event", YEAR_QUERY, "unused").generate_with(Reply::Hang),
    );
    let store = Arc::new(FakeGraphStore::new(Vec::new()));
    let pipeline = pipeline(llm, store.clone());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let response = pipeline
        .query_with_cancel(Question::new("Tell me about EID5", None), token)
        .await;

    let failure = response.error.as_ref().expect("failure");
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.stage, WorkflowStage::GenerateQuery);
    assert_eq!(store.run_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_questions_do_not_share_state() {
    let llm = Arc::new(ScriptedModel::new("temporal_analysis", YEAR_QUERY, "EID1."));
    let store = Arc::new(FakeGraphStore::new(vec![event_row("EID1", 1950)]));
    let pipeline = pipeline(llm, store);

    let questions = (0..8).map(|i| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .query(Question::new(format!("Question {i}"), Some(format!("s{i}"))))
                .await
        })
    });
    let responses = futures::future::join_all(questions).await;

    let mut request_ids = std::collections::HashSet::new();
    for (i, joined) in responses.into_iter().enumerate() {
        let response = joined.expect("task");
        assert!(response.is_success());
        assert_eq!(response.session_id, Some(format!("s{i}")));
        assert_eq!(response.trace.len(), 8);
        assert!(request_ids.insert(response.request_id));
    }
}
