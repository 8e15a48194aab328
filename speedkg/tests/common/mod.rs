#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use speedkg::config::{ContextConfig, PipelineConfig};
use speedkg::db::GraphStore;
use speedkg::error::{KgError, Result};
use speedkg::llm::{prompts, Completion, CompletionRequest, LanguageModel, TokenUsage};
use speedkg::models::{GraphQuery, ResultRow};
use speedkg::services::Pipeline;

static INIT: Once = Once::new();

pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "speedkg=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// What a fake collaborator does when called.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(String),
    /// Never resolves; used to exercise deadlines and cancellation.
    Hang,
}

/// Per-call usage reported by [`ScriptedModel`].
pub const USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 5,
};

/// Language model that answers each pipeline stage from a script.
pub struct ScriptedModel {
    classify: Reply<String>,
    generate: Reply<String>,
    reason: Reply<String>,
    pub classify_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub reason_calls: AtomicUsize,
    pub reason_requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(intent: &str, query: &str, answer: &str) -> Self {
        Self {
            classify: Reply::Ok(format!("intent: {intent}\nconfidence: 0.92")),
            generate: Reply::Ok(query.to_string()),
            reason: Reply::Ok(answer.to_string()),
            classify_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            reason_calls: AtomicUsize::new(0),
            reason_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn classify_with(mut self, reply: Reply<String>) -> Self {
        self.classify = reply;
        self
    }

    pub fn generate_with(mut self, reply: Reply<String>) -> Self {
        self.generate = reply;
        self
    }

    pub fn reason_with(mut self, reply: Reply<String>) -> Self {
        self.reason = reply;
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.classify_calls.load(Ordering::SeqCst),
            self.generate_calls.load(Ordering::SeqCst),
            self.reason_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let reply = if request.system == prompts::REASONING_SYSTEM_PROMPT {
            self.reason_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requests) = self.reason_requests.lock() {
                requests.push(request.clone());
            }
            &self.reason
        } else if request.user.starts_with("Generate a Cypher query for") {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            &self.generate
        } else {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            &self.classify
        };

        match reply {
            Reply::Ok(text) => Ok(Completion {
                text: text.clone(),
                usage: USAGE,
            }),
            Reply::Fail(message) => Err(KgError::Llm(message.clone())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Graph store returning canned rows for the primary query and the expansion.
pub struct FakeGraphStore {
    primary: Reply<Vec<ResultRow>>,
    expansion: Reply<Vec<ResultRow>>,
    healthy: bool,
    pub queries: Mutex<Vec<GraphQuery>>,
    pub run_calls: AtomicUsize,
}

impl FakeGraphStore {
    pub fn new(primary: Vec<ResultRow>) -> Self {
        Self {
            primary: Reply::Ok(primary),
            expansion: Reply::Ok(Vec::new()),
            healthy: true,
            queries: Mutex::new(Vec::new()),
            run_calls: AtomicUsize::new(0),
        }
    }

    pub fn primary_with(mut self, reply: Reply<Vec<ResultRow>>) -> Self {
        self.primary = reply;
        self
    }

    pub fn expansion_with(mut self, reply: Reply<Vec<ResultRow>>) -> Self {
        self.expansion = reply;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<GraphQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn run(&self, query: &GraphQuery) -> Result<Vec<ResultRow>> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }

        let reply = if query.params.contains_key("seeds") {
            &self.expansion
        } else {
            &self.primary
        };
        match reply {
            Reply::Ok(rows) => Ok(rows.clone()),
            Reply::Fail(message) => Err(KgError::QueryRejected(message.clone())),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn ping(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(KgError::GraphUnavailable("connection refused".to_string()))
        }
    }
}

pub fn row(value: Value) -> ResultRow {
    match value {
        Value::Object(map) => map,
        other => panic!("row must be a JSON object, got {other}"),
    }
}

pub fn event_row(event_id: &str, year: i64) -> ResultRow {
    row(json!({ "e.eventId": event_id, "e.year": year }))
}

/// One expansion row: `nodes`/`edges` lists as the store returns them.
pub fn expansion_row(nodes: Value, edges: Value) -> ResultRow {
    row(json!({ "nodes": nodes, "edges": edges }))
}

pub fn event_node(id: &str, event_id: &str) -> Value {
    json!({ "id": id, "labels": ["Event"], "properties": { "eventId": event_id, "year": 1950 } })
}

pub fn actor_node(id: &str, name: &str) -> Value {
    json!({ "id": id, "labels": ["Actor"], "properties": { "name": name } })
}

pub fn edge(id: &str, rel_type: &str, start: &str, end: &str) -> Value {
    json!({ "id": id, "type": rel_type, "start": start, "end": end, "properties": {} })
}

pub fn pipeline(llm: Arc<dyn LanguageModel>, store: Arc<dyn GraphStore>) -> Pipeline {
    pipeline_with_timeout(llm, store, 120)
}

pub fn pipeline_with_timeout(
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn GraphStore>,
    request_timeout_secs: u64,
) -> Pipeline {
    let config = PipelineConfig {
        request_timeout_secs,
        ..PipelineConfig::default()
    };
    Pipeline::with_settings(
        llm,
        store,
        &config,
        &ContextConfig::default(),
        Duration::from_secs(30),
    )
}
