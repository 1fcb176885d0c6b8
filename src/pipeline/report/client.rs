use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::anthropic::AnthropicClient;
use super::openai::OpenAiClient;
use super::types::LlmClient;
use super::{excerpt, ExtractionError, ProviderError};
use crate::config::Config;

/// Low temperature keeps extraction close to deterministic.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Enough for a report whose timeline has several dozen events.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default per-request timeout, after which the call is a `ProviderError::Timeout`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Fixed parameters of every model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            model: provider.default_model().to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4o-2024-08-06",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "open_ai" | "open-ai" => Ok(Self::OpenAi),
            other => Err(format!(
                "unknown provider '{other}' (expected 'anthropic' or 'openai')"
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => f.write_str("anthropic"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

/// Construct the adapter selected by `config`. Called once by the composition root.
pub fn build_client(config: &Config) -> Result<Box<dyn LlmClient + Send + Sync>, ExtractionError> {
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or_else(|| config.provider.default_base_url());

    let client: Box<dyn LlmClient + Send + Sync> = match config.provider {
        Provider::Anthropic => Box::new(AnthropicClient::new(
            base_url,
            config.api_key(),
            config.request_timeout_secs,
        )?),
        Provider::OpenAi => Box::new(OpenAiClient::new(
            base_url,
            config.api_key(),
            config.request_timeout_secs,
        )?),
    };

    tracing::info!(
        provider = %config.provider,
        base_url,
        timeout_secs = config.request_timeout_secs,
        "Model client initialized"
    );
    Ok(client)
}

/// Blocking HTTP client with the request timeout applied.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ExtractionError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractionError::Config(format!("cannot create HTTP client: {e}")))
}

/// Classify a transport-level failure.
pub(crate) fn map_send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if e.is_connect() {
        ProviderError::Connection(base_url.to_string())
    } else {
        ProviderError::Http(e.to_string())
    }
}

/// Classify a non-2xx answer.
pub(crate) fn map_status_error(status: u16, body: &str) -> ProviderError {
    let body = excerpt(body, 300);
    match status {
        401 | 403 => ProviderError::Auth { status },
        429 => ProviderError::RateLimited(body),
        _ => ProviderError::Api { status, body },
    }
}

/// Scripted LLM client for tests and offline demos.
///
/// Replays `responses` in order; the last entry repeats once the script runs out.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::with_sequence(vec![Ok(response.to_string())])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_sequence(vec![Err(error)])
    }

    pub fn with_sequence(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        _system: &str,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone().unwrap_or(Err(ProviderError::EmptyResponse))
    }
}
