//! OpenAI-compatible chat-completions provider
//!
//! Works against any endpoint speaking the `/chat/completions` wire format
//! (DashScope compatible mode, OpenAI, vLLM, Ollama's OpenAI shim).

use super::{Completion, CompletionRequest, LlmError, TextGenerator, Usage};
use reqwest::blocking::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Configuration
// ============================================================================

pub const MEDGRAPH_LLM_API_KEY_ENV: &str = "MEDGRAPH_LLM_API_KEY";
pub const MEDGRAPH_LLM_BASE_URL_ENV: &str = "MEDGRAPH_LLM_BASE_URL";
pub const MEDGRAPH_LLM_MODEL_ENV: &str = "MEDGRAPH_LLM_MODEL";
pub const MEDGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "MEDGRAPH_LLM_TIMEOUT_SECS";
pub const MEDGRAPH_LLM_MAX_RETRIES_ENV: &str = "MEDGRAPH_LLM_MAX_RETRIES";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DASHSCOPE_API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// Key variables in lookup order.
pub const API_KEY_ENVS: [&str; 3] = [
    MEDGRAPH_LLM_API_KEY_ENV,
    OPENAI_API_KEY_ENV,
    DASHSCOPE_API_KEY_ENV,
];

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: Some(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS)),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through `lookup`. Blank values count as unset.
    ///
    /// - key: first of [`API_KEY_ENVS`] that is set (required)
    /// - timeout: `0` disables it
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = API_KEY_ENVS
            .iter()
            .find_map(|name| get(*name))
            .ok_or(ConfigError::MissingApiKey)?;
        let base_url = get(MEDGRAPH_LLM_BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: MEDGRAPH_LLM_BASE_URL_ENV,
                value: base_url,
                expected: "an http(s) URL",
            });
        }
        let model = get(MEDGRAPH_LLM_MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = match get(MEDGRAPH_LLM_TIMEOUT_SECS_ENV) {
            Some(v) => v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: MEDGRAPH_LLM_TIMEOUT_SECS_ENV,
                value: v,
                expected: "integer seconds; 0 disables",
            })?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };
        let max_retries = match get(MEDGRAPH_LLM_MAX_RETRIES_ENV) {
            Some(v) => v.parse::<u32>().map_err(|_| ConfigError::Invalid {
                var: MEDGRAPH_LLM_MAX_RETRIES_ENV,
                value: v,
                expected: "a non-negative integer",
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        let mut config = Self::new(api_key, base_url, model);
        config.timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        config.max_retries = max_retries;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No LLM API key configured. Set MEDGRAPH_LLM_API_KEY, OPENAI_API_KEY, or DASHSCOPE_API_KEY")]
    MissingApiKey,
    #[error("invalid {var}={value:?} (expected {expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to build http client: {0}")]
    Client(String),
}

// ============================================================================
// OpenAI-compatible Client
// ============================================================================

pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn send_once(&self, body: &serde_json::Value) -> Result<Completion, LlmError> {
        let url = self.config.chat_completions_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(format!("{url}: {e}"))
                } else {
                    LlmError::Network(format!("failed to reach {url}: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(1);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_chat_response(&data, &self.config.model)
    }

    fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self.config.retry_backoff * 2u32.saturating_pow(attempt);
        let wait = match err {
            LlmError::RateLimited { retry_after_ms } => exp.max(Duration::from_millis(*retry_after_ms)),
            _ => exp,
        };
        wait.min(Duration::from_secs(30))
    }
}

impl TextGenerator for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = request_body(&self.config.model, request);
        let mut attempt = 0u32;
        loop {
            match self.send_once(&body) {
                Ok(completion) => {
                    debug!(
                        model = %completion.model,
                        prompt_tokens = completion.usage.prompt_tokens,
                        completion_tokens = completion.usage.completion_tokens,
                        "llm completion"
                    );
                    return Ok(completion);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let wait = self.backoff(attempt, &e);
                    warn!(attempt = attempt + 1, wait_ms = wait.as_millis() as u64, "llm call failed, retrying: {e}");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

pub(crate) fn request_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

pub(crate) fn parse_chat_response(data: &serde_json::Value, model: &str) -> Result<Completion, LlmError> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0]".to_string()))?;
    let text = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))?
        .to_string();

    Ok(Completion {
        text,
        model: data["model"].as_str().unwrap_or(model).to_string(),
        usage: Usage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        },
    })
}

// ============================================================================
// Tests
// ============================================================================
