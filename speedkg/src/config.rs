use serde::Deserialize;
use std::env;
use std::time::Duration;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub graph: GraphConfig,
    pub llm: Option<LlmConfig>,
    pub pipeline: PipelineConfig,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Neo4j connection settings. The driver keeps its own connection pool.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub max_connections: usize,
    pub fetch_size: usize,
    pub query_timeout_secs: u64,
}

impl GraphConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Additional attempts after the first. Zero keeps single-attempt semantics.
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on one question end to end, including every external call.
    pub request_timeout_secs: u64,
    pub default_limit: u32,
    pub max_limit: u32,
    /// Global ceiling applied on top of the per-intent node caps.
    pub max_subgraph_nodes: usize,
    pub classify_max_tokens: u32,
    pub generate_max_tokens: u32,
    pub reason_max_tokens: u32,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            default_limit: 100,
            max_limit: 1000,
            max_subgraph_nodes: 500,
            classify_max_tokens: 200,
            generate_max_tokens: 1000,
            reason_max_tokens: 2000,
        }
    }
}

/// Budget for the text handed to the reasoning model.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    pub row_preview: usize,
    pub aggregation_rows: usize,
    pub nodes_per_label: usize,
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            row_preview: 10,
            aggregation_rows: 50,
            nodes_per_label: 5,
            max_chars: 12_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pipeline_defaults = PipelineConfig::default();
        let context_defaults = ContextConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("SPEEDKG_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("SPEEDKG_PORT", 3000),
            },
            graph: GraphConfig {
                uri: env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
                user: env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
                password: env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".to_string()),
                database: parse_env_opt("NEO4J_DATABASE"),
                max_connections: parse_env_or("NEO4J_MAX_CONNECTIONS", 16),
                fetch_size: parse_env_or("NEO4J_FETCH_SIZE", 500),
                query_timeout_secs: parse_env_or("QUERY_TIMEOUT_SECONDS", 30),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 0),
            }),
            pipeline: PipelineConfig {
                request_timeout_secs: parse_env_or(
                    "REQUEST_TIMEOUT_SECS",
                    pipeline_defaults.request_timeout_secs,
                ),
                default_limit: parse_env_or("DEFAULT_QUERY_LIMIT", pipeline_defaults.default_limit),
                max_limit: parse_env_or("MAX_QUERY_LIMIT", pipeline_defaults.max_limit),
                max_subgraph_nodes: parse_env_or(
                    "MAX_SUBGRAPH_NODES",
                    pipeline_defaults.max_subgraph_nodes,
                ),
                classify_max_tokens: pipeline_defaults.classify_max_tokens,
                generate_max_tokens: pipeline_defaults.generate_max_tokens,
                reason_max_tokens: parse_env_or(
                    "REASON_MAX_TOKENS",
                    pipeline_defaults.reason_max_tokens,
                ),
            },
            context: ContextConfig {
                row_preview: parse_env_or("CONTEXT_ROW_PREVIEW", context_defaults.row_preview),
                aggregation_rows: parse_env_or(
                    "CONTEXT_AGGREGATION_ROWS",
                    context_defaults.aggregation_rows,
                ),
                nodes_per_label: parse_env_or(
                    "CONTEXT_NODES_PER_LABEL",
                    context_defaults.nodes_per_label,
                ),
                max_chars: parse_env_or("CONTEXT_MAX_CHARS", context_defaults.max_chars),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_graph_config_defaults() {
        std::env::remove_var("NEO4J_URI");
        std::env::remove_var("QUERY_TIMEOUT_SECONDS");

        let config = Config::default();
        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.graph.query_timeout_secs, 30);
        assert_eq!(config.graph.query_timeout(), Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_llm_config_absent_without_model() {
        std::env::remove_var("LLM_MODEL");
        let config = Config::default();
        assert!(config.llm.is_none());
    }

    #[test]
    #[serial]
    fn test_llm_config_single_attempt_by_default() {
        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        std::env::remove_var("LLM_MAX_RETRIES");

        let config = Config::default();
        let llm = config.llm.expect("llm config should be present");
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.max_retries, 0);
        assert_eq!(llm.timeout_secs, 30);

        std::env::remove_var("LLM_MODEL");
    }

    #[test]
    #[serial]
    fn test_pipeline_limits_from_env() {
        std::env::set_var("DEFAULT_QUERY_LIMIT", "50");
        std::env::set_var("MAX_SUBGRAPH_NODES", "250");

        let config = Config::default();
        assert_eq!(config.pipeline.default_limit, 50);
        assert_eq!(config.pipeline.max_limit, 1000);
        assert_eq!(config.pipeline.max_subgraph_nodes, 250);

        std::env::remove_var("DEFAULT_QUERY_LIMIT");
        std::env::remove_var("MAX_SUBGRAPH_NODES");
    }

    #[test]
    #[serial]
    fn test_parse_env_or_invalid_value_falls_back() {
        std::env::set_var("__TEST_PARSE_PORT", "not-a-port");
        let result: u16 = parse_env_or("__TEST_PARSE_PORT", 3000);
        assert_eq!(result, 3000);
        std::env::remove_var("__TEST_PARSE_PORT");
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(
            parse_llm_provider_model("openrouter/anthropic/claude-3.5-sonnet"),
            ("openrouter", "anthropic/claude-3.5-sonnet")
        );
        assert_eq!(parse_llm_provider_model("llama3"), ("local", "llama3"));
    }
}
