use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KgError, Result};
use crate::models::{Intent, QueryResponse, Question};
use crate::services::Pipeline;

/// One question with the outcome expected from the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    #[serde(default)]
    pub id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub expected_intent: Option<Intent>,
    /// Substrings the generated query must contain, case-insensitive
    #[serde(default)]
    pub expected_query_contains: Vec<String>,
    #[serde(default)]
    pub query_must_not_contain: Vec<String>,
    #[serde(default)]
    pub min_results: Option<usize>,
    /// The case passes only if the pipeline ends in the error state
    #[serde(default)]
    pub expect_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub id: Option<String>,
    pub question: String,
    pub passed: bool,
    pub intent: Option<Intent>,
    pub intent_correct: Option<bool>,
    pub query_correct: Option<bool>,
    pub generated_query: Option<String>,
    pub result_row_count: usize,
    pub duration_ms: f64,
    pub error: Option<String>,
    pub checks: Vec<CheckOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: median(&sorted),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            max: sorted[sorted.len() - 1],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    /// Share of cases that reached `completed`
    pub success_rate: f64,
    /// `None` when no case states an expected intent
    pub intent_accuracy: Option<f64>,
    pub query_accuracy: Option<f64>,
    pub latency_ms: LatencySummary,
    pub targets_met: TargetsMet,
    pub cases: Vec<CaseResult>,
}

impl EvaluationReport {
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Release thresholds for query accuracy, coverage and tail latency.
pub const QUERY_ACCURACY_TARGET: f64 = 0.90;
pub const COVERAGE_TARGET: f64 = 0.85;
pub const LATENCY_P95_TARGET_MS: f64 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsMet {
    pub query_accuracy: bool,
    pub coverage: bool,
    pub latency_p95: bool,
}

impl TargetsMet {
    pub fn all(&self) -> bool {
        self.query_accuracy && self.coverage && self.latency_p95
    }
}

/// One metric measured in two runs. Positive `delta` means the candidate
/// scored higher, which for latency is a regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub baseline: Option<f64>,
    pub candidate: Option<f64>,
    pub delta: Option<f64>,
}

impl MetricDelta {
    fn new(baseline: Option<f64>, candidate: Option<f64>) -> Self {
        Self {
            baseline,
            candidate,
            delta: baseline.zip(candidate).map(|(b, c)| c - b),
        }
    }
}

/// Checks that failed in a run, grouped by check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub check: String,
    pub count: usize,
    /// Case id, or the question when the case has no id
    pub cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportComparison {
    pub success_rate: MetricDelta,
    pub intent_accuracy: MetricDelta,
    pub query_accuracy: MetricDelta,
    pub latency_p50_ms: MetricDelta,
    pub latency_p95_ms: MetricDelta,
    /// Cases passing in the baseline and failing in the candidate
    pub regressed: Vec<String>,
    pub fixed: Vec<String>,
    pub baseline_failures: Vec<FailurePattern>,
    pub candidate_failures: Vec<FailurePattern>,
}

pub fn compare_reports(baseline: &EvaluationReport, candidate: &EvaluationReport) -> ReportComparison {
    let outcome_of = |report: &EvaluationReport| {
        report
            .cases
            .iter()
            .map(|c| (case_label(c), c.passed))
            .collect::<HashMap<_, _>>()
    };
    let before = outcome_of(baseline);

    let mut regressed = Vec::new();
    let mut fixed = Vec::new();
    for case in &candidate.cases {
        let label = case_label(case);
        match (before.get(&label), case.passed) {
            (Some(true), false) => regressed.push(label),
            (Some(false), true) => fixed.push(label),
            _ => {}
        }
    }

    ReportComparison {
        success_rate: MetricDelta::new(Some(baseline.success_rate), Some(candidate.success_rate)),
        intent_accuracy: MetricDelta::new(baseline.intent_accuracy, candidate.intent_accuracy),
        query_accuracy: MetricDelta::new(baseline.query_accuracy, candidate.query_accuracy),
        latency_p50_ms: MetricDelta::new(
            Some(baseline.latency_ms.p50),
            Some(candidate.latency_ms.p50),
        ),
        latency_p95_ms: MetricDelta::new(
            Some(baseline.latency_ms.p95),
            Some(candidate.latency_ms.p95),
        ),
        regressed,
        fixed,
        baseline_failures: failure_patterns(baseline),
        candidate_failures: failure_patterns(candidate),
    }
}

/// Most frequent failing check first; ties ordered by check text.
pub fn failure_patterns(report: &EvaluationReport) -> Vec<FailurePattern> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for case in report.cases.iter().filter(|c| !c.passed) {
        for check in case.checks.iter().filter(|c| !c.passed) {
            groups
                .entry(check.check.as_str())
                .or_default()
                .push(case_label(case));
        }
    }

    let mut patterns: Vec<FailurePattern> = groups
        .into_iter()
        .map(|(check, cases)| FailurePattern {
            check: check.to_string(),
            count: cases.len(),
            cases,
        })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count));
    patterns
}

fn case_label(case: &CaseResult) -> String {
    case.id.clone().unwrap_or_else(|| case.question.clone())
}

/// Runs evaluation cases through a pipeline one at a time.
pub struct EvaluationRunner {
    pipeline: Pipeline,
}

impl EvaluationRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn load_cases(path: impl AsRef<Path>) -> Result<Vec<EvalCase>> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let cases: Vec<EvalCase> = serde_json::from_str(&raw)?;
        if cases.is_empty() {
            return Err(KgError::Validation(format!(
                "No evaluation cases in {}",
                path.display()
            )));
        }
        Ok(cases)
    }

    pub async fn run(&self, cases: &[EvalCase]) -> EvaluationReport {
        let mut results = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let response = self
                .pipeline
                .query(Question::new(case.question.clone(), None))
                .await;
            let result = score_case(case, &response);
            tracing::info!(
                case = index + 1,
                total = cases.len(),
                passed = result.passed,
                duration_ms = result.duration_ms,
                "Evaluation case finished"
            );
            results.push(result);
        }
        summarize(results)
    }
}

pub fn score_case(case: &EvalCase, response: &QueryResponse) -> CaseResult {
    let mut checks = Vec::new();
    let query_upper = response
        .generated_query
        .as_deref()
        .unwrap_or_default()
        .to_uppercase();

    let intent_correct = case.expected_intent.map(|expected| {
        let passed = response.intent == Some(expected);
        checks.push(CheckOutcome {
            check: format!("Intent is {expected}"),
            passed,
        });
        passed
    });

    let has_query_checks =
        !case.expected_query_contains.is_empty() || !case.query_must_not_contain.is_empty();
    let mut query_passed = true;
    for keyword in &case.expected_query_contains {
        let passed = query_upper.contains(&keyword.to_uppercase());
        query_passed &= passed;
        checks.push(CheckOutcome {
            check: format!("Query contains '{keyword}'"),
            passed,
        });
    }
    for keyword in &case.query_must_not_contain {
        let passed = !query_upper.contains(&keyword.to_uppercase());
        query_passed &= passed;
        checks.push(CheckOutcome {
            check: format!("Query does not contain '{keyword}'"),
            passed,
        });
    }

    if let Some(min) = case.min_results {
        checks.push(CheckOutcome {
            check: format!("At least {min} results"),
            passed: response.result_row_count >= min,
        });
    }

    checks.push(if case.expect_error {
        CheckOutcome {
            check: "Pipeline reports an error".to_string(),
            passed: !response.is_success(),
        }
    } else {
        CheckOutcome {
            check: "No errors".to_string(),
            passed: response.is_success(),
        }
    });

    CaseResult {
        id: case.id.clone(),
        question: case.question.clone(),
        passed: checks.iter().all(|c| c.passed),
        intent: response.intent,
        intent_correct,
        query_correct: has_query_checks.then_some(query_passed),
        generated_query: response.generated_query.clone(),
        result_row_count: response.result_row_count,
        duration_ms: response.total_duration_ms,
        error: response.error.as_ref().map(ToString::to_string),
        checks,
    }
}

fn summarize(cases: Vec<CaseResult>) -> EvaluationReport {
    let total = cases.len();
    let passed = cases.iter().filter(|c| c.passed).count();
    let succeeded = cases.iter().filter(|c| c.error.is_none()).count();
    let latencies: Vec<f64> = cases.iter().map(|c| c.duration_ms).collect();
    let success_rate = ratio(succeeded, total);
    let query_accuracy = accuracy(cases.iter().filter_map(|c| c.query_correct));
    let latency_ms = LatencySummary::from_samples(&latencies);

    EvaluationReport {
        generated_at: Utc::now(),
        total,
        passed,
        pass_rate: ratio(passed, total),
        success_rate,
        intent_accuracy: accuracy(cases.iter().filter_map(|c| c.intent_correct)),
        query_accuracy,
        latency_ms,
        targets_met: TargetsMet {
            query_accuracy: query_accuracy.is_some_and(|a| a >= QUERY_ACCURACY_TARGET),
            coverage: success_rate >= COVERAGE_TARGET,
            latency_p95: latency_ms.p95 < LATENCY_P95_TARGET_MS,
        },
        cases,
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn accuracy(outcomes: impl Iterator<Item = bool>) -> Option<f64> {
    let (hits, count) = outcomes.fold((0, 0), |(hits, count), ok| {
        (hits + usize::from(ok), count + 1)
    });
    (count > 0).then(|| ratio(hits, count))
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = (sorted.len() as f64 * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryStatus, Trace};

    fn response(intent: Intent, query: &str, rows: usize, ok: bool) -> QueryResponse {
        QueryResponse {
            request_id: "r".to_string(),
            session_id: None,
            question: "q".to_string(),
            status: if ok {
                QueryStatus::Completed
            } else {
                QueryStatus::Failed
            },
            intent: Some(intent),
            intent_confidence: Some(0.9),
            answer: ok.then(|| "answer".to_string()),
            generated_query: Some(query.to_string()),
            citations: Vec::new(),
            result_row_count: rows,
            subgraph_node_count: 0,
            subgraph_edge_count: 0,
            total_tokens: 0,
            total_duration_ms: 10.0,
            trace: Trace::new(),
            error: None,
        }
    }

    fn case(question: &str) -> EvalCase {
        EvalCase {
            id: None,
            question: question.to_string(),
            expected_intent: None,
            expected_query_contains: Vec::new(),
            query_must_not_contain: Vec::new(),
            min_results: None,
            expect_error: false,
        }
    }

    #[test]
    fn test_latency_percentiles() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let summary = LatencySummary::from_samples(&samples);
        assert_eq!(summary.p50, 50.5);
        assert_eq!(summary.p95, 96.0);
        assert_eq!(summary.p99, 100.0);
        assert_eq!(summary.max, 100.0);
        assert_eq!(LatencySummary::from_samples(&[]), LatencySummary::default());
    }

    #[test]
    fn test_score_case_checks_intent_and_query() {
        let mut c = case("What events occurred in 1950?");
        c.expected_intent = Some(Intent::TemporalAnalysis);
        c.expected_query_contains = vec!["e.year = 1950".to_string(), "limit".to_string()];

        let good = score_case(
            &c,
            &response(
                Intent::TemporalAnalysis,
                "MATCH (e:Event) WHERE e.year = 1950 RETURN e LIMIT 100",
                3,
                true,
            ),
        );
        assert!(good.passed);
        assert_eq!(good.intent_correct, Some(true));
        assert_eq!(good.query_correct, Some(true));

        let bad = score_case(
            &c,
            &response(Intent::PatternAnalysis, "MATCH (e) RETURN e LIMIT 5", 3, true),
        );
        assert!(!bad.passed);
        assert_eq!(bad.intent_correct, Some(false));
        assert_eq!(bad.query_correct, Some(false));
    }

    #[test]
    fn test_expect_error_case() {
        let mut c = case("Delete everything");
        c.expect_error = true;
        let result = score_case(&c, &response(Intent::PatternAnalysis, "", 0, false));
        assert!(result.passed);
        assert_eq!(result.query_correct, None);
    }

    #[test]
    fn test_summary_ratios() {
        let mut intent_case = case("q1");
        intent_case.expected_intent = Some(Intent::SingleEvent);
        let results = vec![
            score_case(&intent_case, &response(Intent::SingleEvent, "", 1, true)),
            score_case(&case("q2"), &response(Intent::SingleEvent, "", 0, false)),
        ];
        let report = summarize(results);
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.pass_rate, 0.5);
        assert_eq!(report.intent_accuracy, Some(1.0));
        assert_eq!(report.query_accuracy, None);
        assert!(!report.targets_met.query_accuracy);
        assert!(!report.targets_met.coverage);
        assert!(report.targets_met.latency_p95);
    }

    #[test]
    fn test_case_json_uses_snake_case_fields() {
        let cases: Vec<EvalCase> = serde_json::from_str(
            r#"[{"question": "Who attacked whom in 1950?",
                 "expected_intent": "actor_analysis",
                 "expected_query_contains": ["INITIATED_BY"]}]"#,
        )
        .unwrap();
        assert_eq!(cases[0].expected_intent, Some(Intent::ActorAnalysis));
        assert_eq!(cases[0].expected_query_contains, vec!["INITIATED_BY"]);
        assert!(!cases[0].expect_error);
        assert_eq!(cases[0].min_results, None);
    }
}
