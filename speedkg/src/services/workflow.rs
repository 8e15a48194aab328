use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{Config, ContextConfig, PipelineConfig};
use crate::db::{GraphExecutor, GraphStore};
use crate::error::{KgError, Result};
use crate::intelligence::{
    ContextSerializer, IntentClassifier, QueryGenerator, QueryValidator, Reasoner,
    SubgraphExpander,
};
use crate::llm::{LanguageModel, TokenUsage};
use crate::models::{
    Classification, ErrorKind, PipelineFailure, QueryResponse, Question, RequestState, Subgraph,
    TraceStep, WorkflowStage,
};
use crate::services::state_machine::validate_transition;

/// Why a guarded external call did not produce a value.
#[derive(Debug)]
enum CallError {
    Failed(KgError),
    TimedOut,
    Cancelled,
}

impl CallError {
    fn interruption(&self) -> Option<(ErrorKind, &'static str)> {
        match self {
            Self::TimedOut => Some((ErrorKind::Timeout, "Request deadline exceeded")),
            Self::Cancelled => Some((ErrorKind::Cancelled, "Request cancelled")),
            Self::Failed(_) => None,
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "{error}"),
            Self::TimedOut => f.write_str("Request deadline exceeded"),
            Self::Cancelled => f.write_str("Request cancelled"),
        }
    }
}

/// Deadline and cancellation shared by every external call of one request.
struct CallGuard {
    deadline: Instant,
    cancel: CancellationToken,
}

impl CallGuard {
    async fn run<T>(
        &self,
        call: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, CallError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            outcome = tokio::time::timeout_at(self.deadline, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(CallError::Failed(error)),
                Err(_) => Err(CallError::TimedOut),
            },
        }
    }
}

/// Timing for one trace step.
struct StepTimer {
    stage: WorkflowStage,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StepTimer {
    fn start(stage: WorkflowStage) -> Self {
        Self {
            stage,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn finish(
        self,
        state: &mut RequestState,
        success: bool,
        error: Option<String>,
        details: Value,
    ) {
        state.trace.record(TraceStep {
            step: self.stage,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            success,
            error,
            details,
        });
    }
}

/// Question-answering workflow: classify, generate, validate, execute,
/// expand, serialize, reason.
///
/// Each call to [`Pipeline::query`] owns its own [`RequestState`]; the
/// pipeline itself only holds shared, read-only collaborators and can be
/// cloned freely across tasks.
#[derive(Clone)]
pub struct Pipeline {
    classifier: IntentClassifier,
    generator: QueryGenerator,
    validator: QueryValidator,
    executor: GraphExecutor,
    expander: SubgraphExpander,
    serializer: ContextSerializer,
    reasoner: Reasoner,
    request_timeout: Duration,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn GraphStore>, config: &Config) -> Self {
        Self::with_settings(
            llm,
            store,
            &config.pipeline,
            &config.context,
            config.graph.query_timeout(),
        )
    }

    pub fn with_settings(
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn GraphStore>,
        pipeline: &PipelineConfig,
        context: &ContextConfig,
        query_timeout: Duration,
    ) -> Self {
        let executor = GraphExecutor::new(store, query_timeout);
        Self {
            classifier: IntentClassifier::new(llm.clone(), pipeline.classify_max_tokens),
            generator: QueryGenerator::new(llm.clone(), pipeline.generate_max_tokens),
            validator: QueryValidator::new(pipeline.default_limit, pipeline.max_limit),
            expander: SubgraphExpander::new(executor.clone(), pipeline.max_subgraph_nodes),
            executor,
            serializer: ContextSerializer::new(context.clone()),
            reasoner: Reasoner::new(llm, pipeline.reason_max_tokens),
            request_timeout: pipeline.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn query(&self, question: Question) -> QueryResponse {
        self.query_with_cancel(question, CancellationToken::new())
            .await
    }

    /// Run one question to a terminal state. Never fails: errors are carried
    /// in the response together with the trace so far.
    pub async fn query_with_cancel(
        &self,
        question: Question,
        cancel: CancellationToken,
    ) -> QueryResponse {
        let state = RequestState::new(question);
        let span = tracing::info_span!(
            "query",
            request_id = %state.request_id,
            session_id = state.question.session_id().unwrap_or("-"),
        );

        let guard = CallGuard {
            deadline: Instant::now() + self.request_timeout,
            cancel,
        };

        async move {
            let state = self.run(state, &guard).await;
            let response = state.into_response();
            match &response.error {
                None => tracing::info!(
                    duration_ms = response.total_duration_ms,
                    tokens = response.total_tokens,
                    "Question answered"
                ),
                Some(failure) => tracing::warn!(
                    kind = %failure.kind,
                    stage = %failure.stage,
                    error = %failure.message,
                    "Question failed"
                ),
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn run(&self, mut state: RequestState, guard: &CallGuard) -> RequestState {
        let mut stage = WorkflowStage::ParseIntent;
        tracing::info!(question = %state.question.text(), "Processing question");

        while !stage.is_terminal() {
            let next = match stage {
                WorkflowStage::ParseIntent => self.parse_intent(&mut state, guard).await,
                WorkflowStage::GenerateQuery => self.generate_query(&mut state, guard).await,
                WorkflowStage::Validate => self.validate(&mut state),
                WorkflowStage::ExecuteQuery => self.execute_query(&mut state, guard).await,
                WorkflowStage::ExpandSubgraph => self.expand_subgraph(&mut state, guard).await,
                WorkflowStage::Serialize => self.serialize(&mut state),
                WorkflowStage::Reason => self.reason(&mut state, guard).await,
                WorkflowStage::Complete | WorkflowStage::Error => stage,
            };

            let transition = validate_transition(stage, next);
            debug_assert!(transition.is_ok(), "{transition:?}");
            stage = next;
        }

        let timer = StepTimer::start(stage);
        if let Some(failure) = state.failure.clone() {
            let details = json!({ "kind": failure.kind, "stage": failure.stage });
            timer.finish(&mut state, false, Some(failure.message), details);
        } else {
            let details = json!({
                "citations": state.citations.len(),
                "total_tokens": state.total_tokens,
            });
            timer.finish(&mut state, true, None, details);
        }

        state
    }

    fn add_usage(state: &mut RequestState, usage: TokenUsage) {
        state.total_tokens = state.total_tokens.saturating_add(usage.total());
    }

    /// Record the failing step and move to `Error`.
    fn fail(
        state: &mut RequestState,
        timer: StepTimer,
        kind: ErrorKind,
        message: String,
        details: Value,
    ) -> WorkflowStage {
        let stage = timer.stage;
        timer.finish(state, false, Some(message.clone()), details);
        state.failure = Some(PipelineFailure::new(kind, stage, message));
        WorkflowStage::Error
    }

    async fn parse_intent(&self, state: &mut RequestState, guard: &CallGuard) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::ParseIntent);
        let outcome = guard.run(self.classifier.classify(state.question.text())).await;

        let (classification, error) = match outcome {
            Ok((classification, usage)) => {
                Self::add_usage(state, usage);
                (classification, None)
            }
            Err(error) => {
                if let Some((kind, message)) = error.interruption() {
                    return Self::fail(state, timer, kind, message.to_string(), json!({}));
                }
                tracing::warn!(error = %error, "Intent classification failed, using fallback");
                (Classification::fallback(), Some(error.to_string()))
            }
        };

        tracing::info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            "Intent classified"
        );
        state.classification = Some(classification);
        let details = json!({
            "intent": classification.intent,
            "confidence": classification.confidence,
            "fallback": error.is_some(),
        });
        timer.finish(state, error.is_none(), error, details);
        WorkflowStage::GenerateQuery
    }

    async fn generate_query(&self, state: &mut RequestState, guard: &CallGuard) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::GenerateQuery);
        let intent = state.intent();

        match guard
            .run(self.generator.generate(state.question.text(), intent))
            .await
        {
            Ok((query, usage)) => {
                Self::add_usage(state, usage);
                let details = json!({ "intent": intent, "query": query.text });
                state.query = Some(query);
                timer.finish(state, true, None, details);
                WorkflowStage::Validate
            }
            Err(error) => {
                if let Some((kind, message)) = error.interruption() {
                    return Self::fail(state, timer, kind, message.to_string(), json!({}));
                }
                Self::fail(
                    state,
                    timer,
                    ErrorKind::GenerationFailure,
                    error.to_string(),
                    json!({ "intent": intent }),
                )
            }
        }
    }

    fn validate(&self, state: &mut RequestState) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::Validate);
        let Some(query) = state.query.take() else {
            return Self::fail(
                state,
                timer,
                ErrorKind::GenerationFailure,
                "No query to validate".to_string(),
                json!({}),
            );
        };

        let (query, error) = self.validator.check(query);
        let details = json!({ "query": query.text, "is_valid": query.is_valid });
        state.query = Some(query);

        match error {
            None => {
                timer.finish(state, true, None, details);
                WorkflowStage::ExecuteQuery
            }
            Some(error) => {
                tracing::warn!(error = %error, "Generated query rejected");
                Self::fail(state, timer, ErrorKind::SecurityViolation, error.to_string(), details)
            }
        }
    }

    async fn execute_query(&self, state: &mut RequestState, guard: &CallGuard) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::ExecuteQuery);
        let text = state
            .query
            .as_ref()
            .filter(|q| q.is_valid)
            .map(|q| q.text.clone());
        let Some(text) = text else {
            return Self::fail(
                state,
                timer,
                ErrorKind::SecurityViolation,
                "Refusing to execute an unvalidated query".to_string(),
                json!({}),
            );
        };

        match guard.run(self.executor.execute(&text)).await {
            Ok(rows) => {
                tracing::info!(rows = rows.len(), "Query executed");
                let details = json!({ "row_count": rows.len() });
                state.rows = rows;
                timer.finish(state, true, None, details);
                WorkflowStage::ExpandSubgraph
            }
            Err(error) => {
                if let Some((kind, message)) = error.interruption() {
                    return Self::fail(state, timer, kind, message.to_string(), json!({}));
                }
                let retryable = matches!(&error, CallError::Failed(e) if e.is_retryable());
                Self::fail(
                    state,
                    timer,
                    ErrorKind::ExecutionFailure,
                    error.to_string(),
                    json!({ "retryable": retryable }),
                )
            }
        }
    }

    async fn expand_subgraph(&self, state: &mut RequestState, guard: &CallGuard) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::ExpandSubgraph);
        let intent = state.intent();

        match guard.run(self.expander.expand(&state.rows, intent)).await {
            Ok(subgraph) => {
                let details = json!({
                    "intent": intent,
                    "node_count": subgraph.node_count,
                    "edge_count": subgraph.edge_count,
                    "seed_count": subgraph.seed_count,
                    "aggregation_only": subgraph.aggregation_only,
                    "degraded": false,
                });
                state.subgraph = Some(subgraph);
                timer.finish(state, true, None, details);
            }
            Err(error) => {
                if let Some((kind, message)) = error.interruption() {
                    return Self::fail(state, timer, kind, message.to_string(), json!({}));
                }
                tracing::warn!(error = %error, "Subgraph expansion failed, using result rows only");
                state.subgraph = Some(Subgraph::aggregation());
                let details = json!({ "intent": intent, "degraded": true });
                timer.finish(state, false, Some(error.to_string()), details);
            }
        }
        WorkflowStage::Serialize
    }

    fn serialize(&self, state: &mut RequestState) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::Serialize);
        let subgraph = state.subgraph.clone().unwrap_or_default();
        let context = self.serializer.serialize(&state.rows, &subgraph);
        let details = json!({ "context_chars": context.chars().count() });
        state.context = Some(context);
        timer.finish(state, true, None, details);
        WorkflowStage::Reason
    }

    async fn reason(&self, state: &mut RequestState, guard: &CallGuard) -> WorkflowStage {
        let timer = StepTimer::start(WorkflowStage::Reason);
        let context = state.context.clone().unwrap_or_default();
        let query = state.query.as_ref().map(|q| q.text.clone());

        match guard
            .run(
                self.reasoner
                    .reason(state.question.text(), &context, query.as_deref()),
            )
            .await
        {
            Ok(reasoned) => {
                Self::add_usage(state, reasoned.usage);
                let details = json!({
                    "citations": reasoned.citations.len(),
                    "tokens": reasoned.usage.total(),
                });
                state.answer = Some(reasoned.answer);
                state.citations = reasoned.citations;
                timer.finish(state, true, None, details);
                WorkflowStage::Complete
            }
            Err(error) => {
                if let Some((kind, message)) = error.interruption() {
                    return Self::fail(state, timer, kind, message.to_string(), json!({}));
                }
                Self::fail(
                    state,
                    timer,
                    ErrorKind::ReasoningFailure,
                    error.to_string(),
                    json!({}),
                )
            }
        }
    }
}
