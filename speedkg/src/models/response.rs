use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    Classification, GeneratedQuery, Intent, PipelineFailure, Question, ResultRow, Subgraph, Trace,
};

/// Everything one request accumulates while moving through the workflow.
///
/// Owned by exactly one running workflow and dropped when it finishes.
#[derive(Debug)]
pub struct RequestState {
    pub request_id: Uuid,
    pub question: Question,
    pub classification: Option<Classification>,
    pub query: Option<GeneratedQuery>,
    pub rows: Vec<ResultRow>,
    pub subgraph: Option<Subgraph>,
    pub context: Option<String>,
    pub answer: Option<String>,
    pub citations: Vec<String>,
    pub total_tokens: u32,
    pub trace: Trace,
    pub failure: Option<PipelineFailure>,
    started: Instant,
}

impl RequestState {
    pub fn new(question: Question) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            question,
            classification: None,
            query: None,
            rows: Vec::new(),
            subgraph: None,
            context: None,
            answer: None,
            citations: Vec::new(),
            total_tokens: 0,
            trace: Trace::new(),
            failure: None,
            started: Instant::now(),
        }
    }

    /// Intent chosen for this request; the fallback intent before classification ran.
    pub fn intent(&self) -> Intent {
        self.classification
            .map(|c| c.intent)
            .unwrap_or(Classification::FALLBACK_INTENT)
    }

    pub fn into_response(self) -> QueryResponse {
        let total_duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let status = if self.failure.is_some() {
            QueryStatus::Failed
        } else {
            QueryStatus::Completed
        };
        let (subgraph_node_count, subgraph_edge_count) = self
            .subgraph
            .as_ref()
            .map(|s| (s.node_count, s.edge_count))
            .unwrap_or((0, 0));

        QueryResponse {
            request_id: self.request_id.to_string(),
            session_id: self.question.session_id().map(str::to_string),
            question: self.question.text().to_string(),
            status,
            intent: self.classification.map(|c| c.intent),
            intent_confidence: self.classification.map(|c| c.confidence),
            answer: if self.failure.is_some() {
                None
            } else {
                self.answer
            },
            generated_query: self.query.map(|q| q.text),
            citations: self.citations,
            result_row_count: self.rows.len(),
            subgraph_node_count,
            subgraph_edge_count,
            total_tokens: self.total_tokens,
            total_duration_ms,
            trace: self.trace,
            error: self.failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Completed,
    Failed,
}

/// Result of one question at the pipeline boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub question: String,
    pub status: QueryStatus,
    pub intent: Option<Intent>,
    pub intent_confidence: Option<f32>,
    pub answer: Option<String>,
    pub generated_query: Option<String>,
    pub citations: Vec<String>,
    pub result_row_count: usize,
    pub subgraph_node_count: usize,
    pub subgraph_edge_count: usize,
    pub total_tokens: u32,
    pub total_duration_ms: f64,
    pub trace: Trace,
    pub error: Option<PipelineFailure>,
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Completed
    }
}
