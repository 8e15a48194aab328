use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowStage;

/// Record of one workflow node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: WorkflowStage,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: Value,
}

/// Append-only, ordered record of every step of one request.
///
/// Steps can be appended and read but never reordered or edited.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    /// Steps recorded for one workflow stage, in order.
    pub fn for_stage(&self, stage: WorkflowStage) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(move |s| s.step == stage)
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }
}
