//! Concrete completion backends.
//!
//! Each backend performs exactly one HTTP exchange per call and maps the
//! outcome onto an [`OracleError`] kind; retrying is the client's job.
//!
//! Status mapping:
//! - 429 and 529 (overloaded) → `rate_limited`
//! - 5xx, timeouts, connection failures → `network`
//! - any other non-success status → `unknown`

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{CompletionBackend, OracleError};
use crate::config::OracleConfig;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Instantiate the backend named by `config.provider`.
///
/// # Errors
///
/// Returns an error if the provider is unknown, `model` is missing, or the
/// `anthropic` provider is selected without `ANTHROPIC_API_KEY` set.
pub fn create_backend(config: &OracleConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "anthropic" => Ok(Arc::new(AnthropicBackend::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

fn http_client(config: &OracleConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> OracleError {
    let message = format!("{} API error {}: {}", provider, status, body);
    match status.as_u16() {
        429 | 529 => OracleError::rate_limited(message),
        _ if status.is_server_error() => OracleError::network(message),
        _ => OracleError::unknown(message),
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> OracleError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        OracleError::network(format!("{} request failed: {}", provider, err))
    } else {
        OracleError::unknown(format!("{} request failed: {}", provider, err))
    }
}

// ============ Disabled ============

/// Backend used when `oracle.provider = "disabled"`; every call fails.
pub struct DisabledBackend;

#[async_trait]
impl CompletionBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::unknown(
            "oracle provider is disabled; set [oracle] provider in config",
        ))
    }
}

// ============ Anthropic ============

/// Anthropic Messages API backend.
///
/// Requires the `ANTHROPIC_API_KEY` environment variable.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for anthropic provider"))?;
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http_client(config)?,
            api_key,
            model,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Anthropic", status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::malformed(format!("Anthropic response body: {}", e)))?;
        parse_anthropic_response(&json)
    }
}

/// Concatenate the `text` blocks of a Messages API response.
fn parse_anthropic_response(json: &serde_json::Value) -> Result<String, OracleError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| OracleError::malformed("Anthropic response: missing content array"))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    Ok(text)
}

// ============ Ollama ============

/// Local Ollama backend using `POST /api/generate` in JSON mode.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
}

impl OllamaBackend {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: http_client(config)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": { "num_predict": self.max_tokens },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let mut err = transport_error("Ollama", e);
                err.message = format!("{} (is Ollama running at {}?)", err.message, self.url);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::malformed(format!("Ollama response body: {}", e)))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| OracleError::malformed("Ollama response: missing 'response' field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleErrorKind;

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        assert_eq!(
            status_error("x", StatusCode::TOO_MANY_REQUESTS, "").kind,
            OracleErrorKind::RateLimited
        );
        assert_eq!(
            status_error("x", StatusCode::from_u16(529).unwrap(), "").kind,
            OracleErrorKind::RateLimited
        );
        let server = status_error("x", StatusCode::BAD_GATEWAY, "");
        assert_eq!(server.kind, OracleErrorKind::Network);
        assert!(server.retryable);
        let client = status_error("x", StatusCode::BAD_REQUEST, "bad model");
        assert_eq!(client.kind, OracleErrorKind::Unknown);
        assert!(!client.retryable);
    }

    #[test]
    fn anthropic_text_blocks_joined() {
        let json = serde_json::json!({
            "content": [
                { "type": "text", "text": "{\"category\":" },
                { "type": "text", "text": " \"areas\"}" }
            ]
        });
        assert_eq!(
            parse_anthropic_response(&json).unwrap(),
            "{\"category\": \"areas\"}"
        );
        assert!(parse_anthropic_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn disabled_backend_is_selected_by_default() {
        let backend = create_backend(&OracleConfig::default()).unwrap();
        assert_eq!(backend.name(), "disabled");
    }

    #[test]
    fn ollama_requires_model() {
        let config = OracleConfig {
            provider: "ollama".into(),
            ..OracleConfig::default()
        };
        assert!(create_backend(&config).is_err());
    }

    #[tokio::test]
    async fn disabled_backend_fails_fatally() {
        let err = DisabledBackend.complete("p").await.unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::Unknown);
        assert!(!err.retryable);
    }
}
