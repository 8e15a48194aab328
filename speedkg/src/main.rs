use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use speedkg::api::{create_router, AppState};
use speedkg::config::Config;
use speedkg::db::{GraphStore, Neo4jStore};
use speedkg::llm::{LanguageModel, LlmProvider};
use speedkg::models::{QueryResponse, Question};
use speedkg::services::{
    compare_reports, EvaluationReport, EvaluationRunner, FailurePattern, MetricDelta, Pipeline,
};

#[derive(Parser)]
#[command(name = "speedkg")]
#[command(about = "Question answering over the SPEED/CAMEO event graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit
    Ask {
        question: String,

        /// Correlation id carried into logs and the response
        #[arg(long)]
        session_id: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an evaluation case file through the pipeline, or compare two saved reports
    Eval {
        #[arg(required_unless_present = "compare")]
        cases: Option<PathBuf>,

        /// Write the JSON report (or comparison) here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compare two saved reports instead of running cases
        #[arg(long, num_args = 2, value_names = ["BASELINE", "CANDIDATE"], conflicts_with = "cases")]
        compare: Option<Vec<PathBuf>>,
    },

    /// Serve the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    if let Commands::Eval {
        compare: Some(reports),
        output,
        ..
    } = &cli.command
    {
        return compare(reports, output.as_deref()).await;
    }

    let config = Config::from_env();

    tracing::info!(uri = %config.graph.uri, "Connecting to graph store...");
    let store: Arc<dyn GraphStore> = Arc::new(
        Neo4jStore::connect(&config.graph)
            .await
            .context("failed to connect to Neo4j")?,
    );

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!("LLM unavailable - every question will fail at query generation");
    }

    match cli.command {
        Commands::Ask {
            question,
            session_id,
            json,
        } => ask(config, store, llm, question, session_id, json).await,
        Commands::Eval { cases, output, .. } => {
            let cases = cases.context("an evaluation case file is required")?;
            eval(config, store, llm, cases, output).await
        }
        Commands::Serve => serve(config, store, llm).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "speedkg=info,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn ask(
    config: Config,
    store: Arc<dyn GraphStore>,
    llm: LlmProvider,
    question: String,
    session_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(Arc::new(llm), store, &config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let response = pipeline
        .query_with_cancel(Question::new(question, session_id), cancel)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&response);
    }

    match response.error {
        None => Ok(()),
        Some(failure) => Err(failure.into()),
    }
}

fn print_answer(response: &QueryResponse) {
    if let Some(intent) = response.intent {
        println!(
            "Intent:  {intent} ({:.2})",
            response.intent_confidence.unwrap_or_default()
        );
    }
    if let Some(query) = &response.generated_query {
        println!("Query:\n{query}\n");
    }
    if let Some(answer) = &response.answer {
        println!("{answer}\n");
    }
    if !response.citations.is_empty() {
        println!("Citations: {}", response.citations.join(", "));
    }
    println!(
        "Rows: {}  Subgraph: {} nodes / {} edges  Tokens: {}  Time: {:.0}ms",
        response.result_row_count,
        response.subgraph_node_count,
        response.subgraph_edge_count,
        response.total_tokens,
        response.total_duration_ms
    );
}

async fn eval(
    config: Config,
    store: Arc<dyn GraphStore>,
    llm: LlmProvider,
    cases: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let cases = EvaluationRunner::load_cases(&cases)
        .await
        .with_context(|| format!("failed to load cases from {}", cases.display()))?;
    tracing::info!(cases = cases.len(), "Running evaluation");

    let runner = EvaluationRunner::new(Pipeline::new(Arc::new(llm), store, &config));
    let report = runner.run(&cases).await;

    println!("Cases:            {}/{} passed", report.passed, report.total);
    println!("Success rate:     {:.1}%", report.success_rate * 100.0);
    if let Some(accuracy) = report.intent_accuracy {
        println!("Intent accuracy:  {:.1}%", accuracy * 100.0);
    }
    if let Some(accuracy) = report.query_accuracy {
        println!("Query accuracy:   {:.1}%", accuracy * 100.0);
    }
    println!(
        "Latency p50/p95/p99: {:.0} / {:.0} / {:.0} ms",
        report.latency_ms.p50, report.latency_ms.p95, report.latency_ms.p99
    );
    println!(
        "Targets met:      {}",
        if report.targets_met.all() { "yes" } else { "no" }
    );

    if let Some(path) = output {
        report.save(&path).await?;
        tracing::info!(path = %path.display(), "Evaluation report written");
    }

    Ok(())
}

async fn compare(reports: &[PathBuf], output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let [baseline_path, candidate_path] = reports else {
        anyhow::bail!("--compare takes exactly two report files");
    };
    let baseline = EvaluationReport::load(baseline_path)
        .await
        .with_context(|| format!("failed to load report {}", baseline_path.display()))?;
    let candidate = EvaluationReport::load(candidate_path)
        .await
        .with_context(|| format!("failed to load report {}", candidate_path.display()))?;

    let comparison = compare_reports(&baseline, &candidate);

    print_delta("Success rate", &comparison.success_rate, 100.0, "%");
    print_delta("Intent accuracy", &comparison.intent_accuracy, 100.0, "%");
    print_delta("Query accuracy", &comparison.query_accuracy, 100.0, "%");
    print_delta("Latency p50", &comparison.latency_p50_ms, 1.0, " ms");
    print_delta("Latency p95", &comparison.latency_p95_ms, 1.0, " ms");

    if !comparison.regressed.is_empty() {
        println!("\nRegressed: {}", comparison.regressed.join(", "));
    }
    if !comparison.fixed.is_empty() {
        println!("Fixed:     {}", comparison.fixed.join(", "));
    }
    print_failures("baseline", &comparison.baseline_failures);
    print_failures("candidate", &comparison.candidate_failures);

    if let Some(path) = output {
        tokio::fs::write(path, serde_json::to_string_pretty(&comparison)?).await?;
        tracing::info!(path = %path.display(), "Comparison written");
    }

    Ok(())
}

fn print_delta(label: &str, metric: &MetricDelta, scale: f64, unit: &str) {
    let show = |value: Option<f64>| match value {
        Some(v) => format!("{:.1}{unit}", v * scale),
        None => "n/a".to_string(),
    };
    let delta = match metric.delta {
        Some(d) => format!("{:+.1}{unit}", d * scale),
        None => "n/a".to_string(),
    };
    println!(
        "{:<17}{} -> {} ({delta})",
        format!("{label}:"),
        show(metric.baseline),
        show(metric.candidate)
    );
}

fn print_failures(run: &str, patterns: &[FailurePattern]) {
    if patterns.is_empty() {
        return;
    }
    println!("\nFailing checks ({run}):");
    for pattern in patterns {
        println!("  {:>3}  {}", pattern.count, pattern.check);
    }
}

async fn serve(config: Config, store: Arc<dyn GraphStore>, llm: LlmProvider) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_router(AppState::new(config, store, llm));

    tracing::info!("SpeedKG starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  Ask:          POST http://{}/api/v1/query", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, draining connections...");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
