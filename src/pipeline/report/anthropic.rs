use serde::{Deserialize, Serialize};

use super::client::{http_client, map_send_error, map_status_error, GenerationOptions};
use super::types::LlmClient;
use super::{ExtractionError, ProviderError};

/// Messages API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client. One POST per `complete`, no retries.
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, ExtractionError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(timeout_secs)?,
            timeout_secs,
        })
    }
}

/// Request body for POST /v1/messages
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from POST /v1/messages
#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl LlmClient for AnthropicClient {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &options.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if parsed.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(
                max_tokens = options.max_tokens,
                "Completion hit the output token budget; the report may be truncated"
            );
        }

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::report::client::test_server::{closed_port_url, serve_once};
    use crate::pipeline::report::client::Provider;

    fn options() -> GenerationOptions {
        GenerationOptions::for_provider(Provider::Anthropic)
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = AnthropicClient::new("https://api.anthropic.com/", "k", 30).unwrap();
        assert_eq!(client.base_url, "https://api.anthropic.com");
        assert_eq!(client.timeout_secs, 30);
    }

    #[test]
    fn sends_messages_request_and_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"{\"title\":"},{"type":"text","text":"\"x\"}"}],"stop_reason":"end_turn"}"#;
        let (url, handle) = serve_once(200, body, Duration::ZERO);
        let client = AnthropicClient::new(&url, "secret-key", 5).unwrap();

        let text = client.complete("system msg", "the prompt", &options()).unwrap();
        assert_eq!(text, r#"{"title":"x"}"#);

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /v1/messages"));
        assert!(request.to_ascii_lowercase().contains("x-api-key: secret-key"));
        assert!(request.contains("anthropic-version: 2023-06-01"));
        let json_start = request.find('{').unwrap();
        let sent: serde_json::Value = serde_json::from_str(&request[json_start..]).unwrap();
        assert_eq!(sent["system"], "system msg");
        assert_eq!(sent["messages"][0]["role"], "user");
        assert_eq!(sent["messages"][0]["content"], "the prompt");
        assert_eq!(sent["max_tokens"], 4096);
    }

    #[test]
    fn empty_completion_is_provider_error() {
        let (url, handle) = serve_once(200, r#"{"content":[],"stop_reason":"end_turn"}"#, Duration::ZERO);
        let client = AnthropicClient::new(&url, "k", 5).unwrap();
        assert_eq!(
            client.complete("s", "p", &options()),
            Err(ProviderError::EmptyResponse)
        );
        handle.join().unwrap();
    }

    #[test]
    fn rate_limit_maps_to_transient_error() {
        let (url, handle) = serve_once(429, r#"{"error":{"type":"rate_limit_error"}}"#, Duration::ZERO);
        let client = AnthropicClient::new(&url, "k", 5).unwrap();
        let err = client.complete("s", "p", &options()).unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
        assert!(err.is_transient());
        handle.join().unwrap();
    }

    #[test]
    fn unauthorized_maps_to_auth_error() {
        let (url, handle) = serve_once(401, r#"{"error":{"type":"authentication_error"}}"#, Duration::ZERO);
        let client = AnthropicClient::new(&url, "bad", 5).unwrap();
        assert_eq!(
            client.complete("s", "p", &options()),
            Err(ProviderError::Auth { status: 401 })
        );
        handle.join().unwrap();
    }

    #[test]
    fn slow_server_times_out() {
        let (url, _handle) = serve_once(200, "{}", Duration::from_secs(3));
        let client = AnthropicClient::new(&url, "k", 1).unwrap();
        assert_eq!(
            client.complete("s", "p", &options()),
            Err(ProviderError::Timeout(1))
        );
    }

    #[test]
    fn refused_connection_maps_to_connection_error() {
        let client = AnthropicClient::new(&closed_port_url(), "k", 2).unwrap();
        let err = client.complete("s", "p", &options()).unwrap_err();
        assert!(matches!(err, ProviderError::Connection(_)));
    }

    #[test]
    fn garbage_body_is_decode_error() {
        let (url, handle) = serve_once(200, "not json", Duration::ZERO);
        let client = AnthropicClient::new(&url, "k", 5).unwrap();
        assert!(matches!(
            client.complete("s", "p", &options()),
            Err(ProviderError::Decode(_))
        ));
        handle.join().unwrap();
    }
}
