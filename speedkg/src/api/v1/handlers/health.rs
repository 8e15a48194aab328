use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;
use crate::llm::LlmBackend;

#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    /// `ok` when every dependency is reachable, `degraded` otherwise.
    pub status: String,
    pub version: String,
    pub graph: GraphStatus,
    pub llm: LlmStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `GET /api/v1/health`
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let graph = match state.store.ping().await {
        Ok(()) => GraphStatus {
            status: "ok".to_string(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Graph health check failed");
            GraphStatus {
                status: "error".to_string(),
                error: Some(e.to_string()),
            }
        }
    };

    let llm = if state.llm.is_available() {
        LlmStatus {
            status: "available".to_string(),
            provider: state.llm_backend.as_ref().map(|b| provider_name(b).to_string()),
            model: state.config.llm.as_ref().map(|c| c.model.clone()),
        }
    } else {
        LlmStatus {
            status: "unavailable".to_string(),
            provider: None,
            model: None,
        }
    };

    let status = if graph.error.is_none() && llm.status == "available" {
        "ok"
    } else {
        "degraded"
    };

    ApiResponse::success(HealthData {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        graph,
        llm,
    })
}

fn provider_name(backend: &LlmBackend) -> &'static str {
    match backend {
        LlmBackend::OpenAI => "openai",
        LlmBackend::OpenRouter => "openrouter",
        LlmBackend::Ollama => "ollama",
        LlmBackend::LmStudio => "lmstudio",
        LlmBackend::OpenAICompatible { .. } => "openai-compatible",
        LlmBackend::Unavailable { .. } => "unavailable",
    }
}
