use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::pipeline::diagnostic::DUMP_DIR_VAR;
use crate::pipeline::report::{
    ExtractionError, GenerationOptions, Provider, RetryPolicy, DEFAULT_MAX_INPUT_CHARS,
    DEFAULT_TIMEOUT_SECS,
};

/// Application-level constants
pub const APP_NAME: &str = "Incident Copilot";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default directory for exported reports (relative to the working directory).
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Upper bound accepted for `REQUEST_TIMEOUT_SECS`.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Map a `LOG_LEVEL` value (Python-style names accepted) to an `EnvFilter` directive.
pub fn default_log_filter(level: Option<&str>) -> String {
    let level = match level.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") | Some("critical") => "error",
        _ => "info",
    };
    format!("incident_copilot_lib={level},incident_copilot={level},warn")
}

/// Runtime configuration for one composition root.
///
/// Built once (CLI start-up, bot start-up) and handed to `build_client` and
/// `ReportGenerator`; nothing reads the environment after that.
#[derive(Clone)]
pub struct Config {
    pub provider: Provider,
    api_key: String,
    pub base_url: Option<String>,
    pub generation: GenerationOptions,
    pub request_timeout_secs: u64,
    pub max_input_chars: usize,
    pub output_dir: PathBuf,
    pub retry_policy: RetryPolicy,
    /// Per-run diagnostic dump base directory; `None` when disabled.
    pub dump_dir: Option<PathBuf>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ExtractionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse::<Provider>().map_err(ExtractionError::Config)?,
            None => Provider::default(),
        };

        let api_key = get(provider.api_key_var()).ok_or_else(|| {
            ExtractionError::Config(format!(
                "{} environment variable is required. Set it in your .env file or environment.",
                provider.api_key_var()
            ))
        })?;

        let mut generation = GenerationOptions::for_provider(provider);
        if let Some(model) = get("MODEL") {
            generation.model = model.trim().to_string();
        }
        generation.temperature = parse_var(&get, "TEMPERATURE", generation.temperature)?;
        validate_temperature(generation.temperature)?;
        generation.max_tokens = parse_var(&get, "MAX_TOKENS", generation.max_tokens)?;
        validate_max_tokens(generation.max_tokens)?;

        let request_timeout_secs = parse_var(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if request_timeout_secs == 0 || request_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ExtractionError::Config(format!(
                "REQUEST_TIMEOUT_SECS must be between 1 and {MAX_TIMEOUT_SECS}, got {request_timeout_secs}"
            )));
        }

        let max_input_chars = parse_var(&get, "MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS)?;
        if max_input_chars == 0 {
            return Err(ExtractionError::Config(
                "MAX_INPUT_CHARS must be greater than zero".into(),
            ));
        }

        let retry_policy = RetryPolicy {
            retry_transient: parse_bool(&get, "RETRY_TRANSIENT", true)?,
            repair_on_parse_failure: parse_bool(&get, "REPAIR_ON_PARSE_FAILURE", false)?,
        };

        Ok(Self {
            provider,
            api_key: api_key.trim().to_string(),
            base_url: get("LLM_BASE_URL").map(|u| u.trim().to_string()),
            generation,
            request_timeout_secs,
            max_input_chars,
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            retry_policy,
            dump_dir: get(DUMP_DIR_VAR).map(|dir| PathBuf::from(dir.trim())),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn with_model(mut self, model: &str) -> Result<Self, ExtractionError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ExtractionError::Config("model name cannot be empty".into()));
        }
        self.generation.model = model.to_string();
        Ok(self)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, ExtractionError> {
        validate_temperature(temperature)?;
        self.generation.temperature = temperature;
        Ok(self)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Result<Self, ExtractionError> {
        validate_max_tokens(max_tokens)?;
        self.generation.max_tokens = max_tokens;
        Ok(self)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("generation", &self.generation)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_input_chars", &self.max_input_chars)
            .field("output_dir", &self.output_dir)
            .field("retry_policy", &self.retry_policy)
            .field("dump_dir", &self.dump_dir)
            .finish()
    }
}

fn validate_temperature(temperature: f32) -> Result<(), ExtractionError> {
    if !(0.0..=1.0).contains(&temperature) {
        return Err(ExtractionError::Config(format!(
            "TEMPERATURE must be between 0.0 and 1.0, got {temperature}"
        )));
    }
    Ok(())
}

fn validate_max_tokens(max_tokens: u32) -> Result<(), ExtractionError> {
    if max_tokens == 0 {
        return Err(ExtractionError::Config(
            "MAX_TOKENS must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T, ExtractionError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ExtractionError::Config(format!("{key} has an invalid value: '{}'", raw.trim()))
        }),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ExtractionError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(ExtractionError::Config(format!(
            "{key} must be true or false, got '{other}'"
        ))),
    }
}
