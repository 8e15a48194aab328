mod evaluation;
pub mod state_machine;
mod workflow;

pub use evaluation::{
    compare_reports, failure_patterns, score_case, CaseResult, CheckOutcome, EvalCase,
    EvaluationReport, EvaluationRunner, FailurePattern, LatencySummary, MetricDelta,
    ReportComparison, TargetsMet, COVERAGE_TARGET, LATENCY_P95_TARGET_MS, QUERY_ACCURACY_TARGET,
};
pub use state_machine::{allowed_transitions, validate_transition, IllegalTransition};
pub use workflow::Pipeline;
