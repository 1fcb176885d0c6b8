pub mod types;
pub mod prompt;
pub mod sanitize;
pub mod repair;
pub mod parser;
pub mod client;
pub mod anthropic;
pub mod openai;
pub mod orchestrator;
pub mod render;
pub mod export;
pub mod transcript;

pub use types::*;
pub use prompt::*;
pub use sanitize::*;
pub use parser::*;
pub use client::*;
pub use anthropic::*;
pub use openai::*;
pub use orchestrator::*;
pub use render::*;
pub use export::*;
pub use transcript::*;

use serde::Serialize;
use thiserror::Error;

/// Maximum characters of raw model output attached to a parse error.
pub const EXCERPT_MAX_CHARS: usize = 500;

/// Coarse error class surfaced to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Config,
    Provider,
    Parse,
}

/// Every failure `generate_report` can return.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Config(_) => ErrorKind::Config,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Complete sentence suitable for showing to the person who submitted the notes.
    pub fn user_message(&self) -> String {
        match self {
            Self::Input(reason) => format!("Invalid input: {reason}"),
            Self::Config(reason) => format!("The copilot is not configured: {reason}"),
            Self::Provider(ProviderError::Connection(_)) => {
                "Unable to connect to the model provider. Please check your internet connection."
                    .to_string()
            }
            Self::Provider(ProviderError::RateLimited(_)) => {
                "The model provider's rate limit was exceeded. Please try again later.".to_string()
            }
            Self::Provider(ProviderError::Timeout(secs)) => {
                format!("The model did not answer within {secs} seconds. Please try again.")
            }
            Self::Provider(ProviderError::Auth { .. }) => {
                "The model provider rejected the API key. Check your credentials.".to_string()
            }
            Self::Provider(other) => format!("Model provider error: {other}"),
            Self::Parse(e) => format!(
                "Received an invalid report from the model ({}). Please try again.",
                e.failure
            ),
        }
    }
}

/// Failures of the single model round-trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Model provider is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Model provider rejected the credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("Model provider returned an error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Model provider returned an empty completion")]
    EmptyResponse,

    #[error("Unreadable provider response: {0}")]
    Decode(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

impl ProviderError {
    /// Whether one more attempt has a realistic chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited(_) | Self::Connection(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Why a model response could not become an `IncidentReport`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no JSON object found")]
    NoJsonObject,

    #[error("malformed JSON at line {line}, column {column}: {detail}")]
    MalformedJson {
        line: usize,
        column: usize,
        detail: String,
    },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Parse failure plus a truncated excerpt of the offending model output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{failure}")]
pub struct ParseError {
    pub failure: ParseFailure,
    pub excerpt: String,
}

impl ParseError {
    pub fn new(failure: ParseFailure, raw: &str) -> Self {
        Self {
            failure,
            excerpt: excerpt(raw, EXCERPT_MAX_CHARS),
        }
    }

    pub fn reason(&self) -> String {
        self.failure.to_string()
    }
}

/// First `max_chars` characters of `raw`, with an ellipsis when cut.
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
