//! Model invocation: the boundary to the external LLM service.
//!
//! Providers only translate a prompt into raw text. Retries live in
//! `RetryingInvoker`, and timeouts are applied by the pipeline.

use async_trait::async_trait;
use rstructor::{GeminiClient, GeminiModel, LLMClient};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::{AgentConfig, Config, ConfigError};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("LLM returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM returned no content")]
    EmptyResponse,
    #[error("LLM did not answer within {0:?}")]
    Timeout(Duration),
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl GenerationError {
    /// Whether trying the same prompt again might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::RequestFailed(_) | GenerationError::Timeout(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::EmptyResponse | GenerationError::ConfigError(_) => false,
        }
    }
}

/// Sends one prompt to a text-generation model and returns its raw output.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

/// Build the invoker described by the configuration, wrapped in the retry policy.
pub fn from_config(config: &Config) -> Result<Box<dyn ModelInvoker>, GenerationError> {
    let api_key = config.api_key()?;
    let agent = &config.agent;
    let policy = RetryPolicy::from_config(agent);

    let invoker: Box<dyn ModelInvoker> = match agent.provider.as_str() {
        "gemini" => Box::new(RetryingInvoker::new(GeminiInvoker::new(api_key, &agent.model)?, policy)),
        "openai" => Box::new(RetryingInvoker::new(
            OpenAiInvoker::new(api_key, &agent.model, &agent.endpoint)?,
            policy,
        )),
        other => return Err(ConfigError::UnknownProvider(other.to_string()).into()),
    };
    Ok(invoker)
}

/// Gemini through rstructor.
pub struct GeminiInvoker {
    client: GeminiClient,
    model: String,
}

impl GeminiInvoker {
    pub fn new(api_key: &str, model: &str) -> Result<Self, GenerationError> {
        let client = GeminiClient::new(api_key)
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?
            .model(parse_gemini_model(model));
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ModelInvoker for GeminiInvoker {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        let result = self
            .client
            .generate_with_metadata(prompt)
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        non_empty(result.text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Parse a model string into a GeminiModel
fn parse_gemini_model(model: &str) -> GeminiModel {
    match model {
        "gemini-2.0-flash" => GeminiModel::Gemini20Flash,
        "gemini-2.5-flash" => GeminiModel::Gemini25Flash,
        "gemini-2.5-pro" => GeminiModel::Gemini25Pro,
        _ => GeminiModel::Gemini25Flash,
    }
}

/// OpenAI-compatible chat completions API (OpenAI, Ollama, vLLM, ...).
pub struct OpenAiInvoker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiInvoker {
    pub fn new(api_key: &str, model: &str, endpoint: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("callsight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ModelInvoker for OpenAiInvoker {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        first_choice_text(&json)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Pull the first candidate's content out of a chat completions response.
fn first_choice_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or(GenerationError::EmptyResponse)?;
    non_empty(text.to_string())
}

fn non_empty(text: String) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(agent: &AgentConfig) -> Self {
        Self {
            max_attempts: agent.max_attempts.max(1),
            base_delay: Duration::from_millis(agent.retry_base_delay_ms),
        }
    }

    /// Delay before the given retry (1 = first retry).
    fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Retries transient failures of the wrapped invoker.
pub struct RetryingInvoker<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I: ModelInvoker> RetryingInvoker<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<I: ModelInvoker> ModelInvoker for RetryingInvoker<I> {
    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut attempt = 1;
        loop {
            match self.inner.invoke(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        model = self.inner.model(),
                        attempt,
                        ?delay,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
