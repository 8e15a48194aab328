use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::StatusCode;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{KgError, Result};
use crate::llm::provider::{Completion, TokenUsage};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "insufficient_quota",
];
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "invalid api key",
    "invalid_api_key",
    "authentication",
];

/// A failed call mapped into the crate error, plus whether another attempt
/// could plausibly succeed.
#[derive(Debug)]
struct Classified {
    error: KgError,
    transient: bool,
}

impl Classified {
    fn transient(error: KgError) -> Self {
        Self {
            error,
            transient: true,
        }
    }

    fn fatal(error: KgError) -> Self {
        Self {
            error,
            transient: false,
        }
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let (provider, stripped_model) = parse_llm_provider_model(&config.model);
        let provider = provider.to_lowercase();

        if requires_api_key(&provider) && config.api_key.is_none() {
            return Err(KgError::LlmUnavailable(format!(
                "{provider} requires LLM_API_KEY"
            )));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&provider).to_string());
        // Local model names may themselves contain a slash.
        let model = if provider == "local" {
            config.model.clone()
        } else {
            stripped_model.to_string()
        };
        let timeout = Duration::from_secs(config.timeout_secs);

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KgError::LlmUnavailable(format!("Failed to build HTTP client: {e}")))?;

        // Retries happen in `complete`; the library makes a single attempt.
        let internal_backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..Default::default()
        };

        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_base(base_url.as_str())
                .with_api_key(config.api_key.clone().unwrap_or_default()),
        )
        .with_http_client(http_client)
        .with_backoff(internal_backoff);

        Ok(Self {
            client,
            base_url,
            model,
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat completion. Transient failures are retried only when
    /// `max_retries` is non-zero.
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
    ) -> Result<Completion> {
        if prompt.trim().is_empty() {
            return Err(KgError::Validation("Prompt cannot be empty".to_string()));
        }

        let request = self.build_request(prompt, system_prompt, max_tokens)?;
        let mut schedule = self.retry_schedule();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match self.client.chat().create(request.clone()).await {
                Ok(response) => return completion_from(response),
                Err(error) => classify(error, self.timeout),
            };

            if !failure.transient || attempt > self.max_retries {
                return Err(failure.error);
            }
            let Some(delay) = schedule.next_backoff() else {
                return Err(failure.error);
            };
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure.error,
                "Retrying LLM completion"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn retry_schedule(&self) -> ExponentialBackoff {
        let mut schedule = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.timeout),
            ..Default::default()
        };
        schedule.reset();
        schedule
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
    ) -> Result<CreateChatCompletionRequest> {
        let invalid = |what: &str, e: OpenAIError| KgError::Validation(format!("Invalid {what}: {e}"));

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if let Some(system) = system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
            let message = ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| invalid("system prompt", e))?;
            messages.push(message.into());
        }
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| invalid("user prompt", e))?;
        messages.push(message.into());

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.as_str())
            .messages(messages)
            .temperature(0.0);
        if max_tokens > 0 {
            args.max_tokens(max_tokens);
        }
        args.build().map_err(|e| invalid("completion request", e))
    }
}

fn completion_from(response: CreateChatCompletionResponse) -> Result<Completion> {
    let usage = response
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let text = response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| KgError::Llm("Model returned no content".to_string()))?;

    Ok(Completion { text, usage })
}

fn classify(error: OpenAIError, timeout: Duration) -> Classified {
    match error {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                Classified::fatal(KgError::LlmRateLimit { retry_after: None })
            }
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Classified::fatal(
                KgError::LlmUnavailable(format!("LLM authentication failed: {e}")),
            ),
            Some(status) if status.is_server_error() => {
                Classified::transient(KgError::Llm(format!("LLM server error: {e}")))
            }
            Some(_) => Classified::fatal(KgError::Llm(format!("LLM request failed: {e}"))),
            None if e.is_timeout() => Classified::transient(KgError::LlmTimeout(timeout)),
            None if e.is_connect() => Classified::transient(KgError::LlmUnavailable(format!(
                "LLM endpoint unreachable: {e}"
            ))),
            None => Classified::transient(KgError::Llm(format!("LLM request failed: {e}"))),
        },
        OpenAIError::ApiError(api) if mentions(&api, RATE_LIMIT_MARKERS) => {
            Classified::fatal(KgError::LlmRateLimit { retry_after: None })
        }
        OpenAIError::ApiError(api) if mentions(&api, AUTH_MARKERS) => Classified::fatal(
            KgError::LlmUnavailable(format!("LLM authentication failed: {api}")),
        ),
        OpenAIError::ApiError(api) => {
            // Typed errors (bad model, bad params) will not change on retry.
            let untyped = api.r#type.is_none() && api.code.is_none();
            let error = KgError::Llm(format!("LLM API error: {api}"));
            Classified {
                error,
                transient: untyped,
            }
        }
        OpenAIError::JSONDeserialize(e) => {
            Classified::fatal(KgError::Llm(format!("Unreadable LLM response: {e}")))
        }
        OpenAIError::InvalidArgument(message) => Classified::fatal(KgError::Validation(message)),
        other => Classified::fatal(KgError::Llm(other.to_string())),
    }
}

fn mentions(api: &ApiError, markers: &[&str]) -> bool {
    let haystack = format!(
        "{} {} {}",
        api.message,
        api.r#type.as_deref().unwrap_or_default(),
        api.code.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    markers.iter().any(|marker| haystack.contains(marker))
}

fn requires_api_key(provider: &str) -> bool {
    matches!(provider, "openai" | "openrouter")
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}
