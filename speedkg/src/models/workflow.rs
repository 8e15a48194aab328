use serde::{Deserialize, Serialize};

/// States of the question-answering workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    ParseIntent,
    GenerateQuery,
    Validate,
    ExecuteQuery,
    ExpandSubgraph,
    Serialize,
    Reason,
    Complete,
    Error,
}

impl WorkflowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseIntent => "parse_intent",
            Self::GenerateQuery => "generate_query",
            Self::Validate => "validate",
            Self::ExecuteQuery => "execute_query",
            Self::ExpandSubgraph => "expand_subgraph",
            Self::Serialize => "serialize",
            Self::Reason => "reason",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Non-fatal; the request continues with a default intent.
    ClassificationFailure,
    GenerationFailure,
    /// Generated query rejected before it reached the store.
    SecurityViolation,
    ExecutionFailure,
    ReasoningFailure,
    /// The per-question deadline elapsed.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
}

impl ErrorKind {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ClassificationFailure)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ClassificationFailure => "classification_failure",
            Self::GenerationFailure => "generation_failure",
            Self::SecurityViolation => "security_violation",
            Self::ExecutionFailure => "execution_failure",
            Self::ReasoningFailure => "reasoning_failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Structured reason a request ended in the `Error` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    /// Stage that was running when the failure occurred
    pub stage: WorkflowStage,
    pub message: String,
}

impl PipelineFailure {
    pub fn new(kind: ErrorKind, stage: WorkflowStage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.stage, self.message)
    }
}

impl std::error::Error for PipelineFailure {}
