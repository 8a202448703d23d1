//! Classification oracle client.
//!
//! The oracle is an external, untrusted text-completion service. This module
//! wraps it behind two layers:
//!
//! - **[`CompletionBackend`]**: one raw request/response exchange with a
//!   provider ([`AnthropicBackend`], [`OllamaBackend`], [`DisabledBackend`],
//!   or the test-only [`mock::ScriptedBackend`]).
//! - **[`OracleClient`]**: builds the prompt from a document and the
//!   taxonomy, enforces the concurrency ceiling, drives retries, and parses
//!   and validates the response into a [`ClassificationResult`].
//!
//! The client never touches the filesystem or the checkpoint store.
//!
//! # Failure classes
//!
//! | Kind | Retried | Source |
//! |------|---------|--------|
//! | `rate_limited` | yes | HTTP 429 / 529 |
//! | `network` | yes | timeouts, connection errors, HTTP 5xx |
//! | `invalid_response` | only for empty completions | unparseable output, schema or taxonomy violations |
//! | `unknown` | no | other HTTP 4xx, disabled provider |

pub mod mock;
mod prompt;
mod providers;
mod retry;

pub use prompt::{build_prompt, parse_response, truncate_content, FILE_MARKER};
pub use providers::{create_backend, AnthropicBackend, DisabledBackend, OllamaBackend};
pub use retry::{next_step, retry_with_backoff, Attempt, RetryPolicy, Step};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::OracleConfig;
use crate::models::{ClassificationResult, Document};
use crate::taxonomy::Taxonomy;

/// Classified cause of an oracle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleErrorKind {
    RateLimited,
    InvalidResponse,
    Network,
    Unknown,
}

impl OracleErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleErrorKind::RateLimited => "rate_limited",
            OracleErrorKind::InvalidResponse => "invalid_response",
            OracleErrorKind::Network => "network",
            OracleErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OracleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct OracleError {
    pub kind: OracleErrorKind,
    pub message: String,
    /// Whether another attempt with identical input may succeed.
    pub retryable: bool,
}

impl OracleError {
    pub fn new(kind: OracleErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::RateLimited, message, true)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::Network, message, true)
    }

    /// Schema or taxonomy violation. Identical input is expected to fail again.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::InvalidResponse, message, false)
    }

    /// Empty or cut-off completion; worth another attempt.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::InvalidResponse, message, true)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(OracleErrorKind::Unknown, message, false)
    }
}

/// One request/response exchange with a completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Provider identifier for logs (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    /// Send `prompt` and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Prompt building, throttling, retry, and response validation around a
/// [`CompletionBackend`].
pub struct OracleClient {
    backend: Arc<dyn CompletionBackend>,
    taxonomy: Taxonomy,
    policy: RetryPolicy,
    permits: Semaphore,
    request_delay: Duration,
    max_content_length: usize,
    summary_max_chars: usize,
}

impl OracleClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, taxonomy: Taxonomy, config: &OracleConfig) -> Self {
        Self {
            backend,
            taxonomy,
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            },
            permits: Semaphore::new(config.max_concurrency.max(1)),
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_content_length: config.max_content_length,
            summary_max_chars: config.summary_max_chars,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Classify one document.
    ///
    /// Transient failures are retried with exponential backoff; retries are
    /// logged but not surfaced. The returned result has already been
    /// validated against the taxonomy.
    pub async fn classify(&self, doc: &Document) -> Result<ClassificationResult, OracleError> {
        let (content, truncated) = truncate_content(&doc.body, self.max_content_length);
        if truncated {
            tracing::debug!(file = %doc.key, limit = self.max_content_length, "content truncated");
        }
        let prompt = build_prompt(&self.taxonomy, &doc.file_name(), &content);
        let fallback_title = doc.stem();

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OracleError::unknown("oracle client is shut down"))?;

        let backend = &self.backend;
        let prompt = &prompt;
        let taxonomy = &self.taxonomy;
        let fallback_title = &fallback_title;
        let delay = self.request_delay;
        let summary_max = self.summary_max_chars;

        retry_with_backoff(&self.policy, &doc.key, || async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = backend.complete(prompt).await.and_then(|text| {
                parse_response(&text, taxonomy, fallback_title, summary_max, truncated)
            });
            Attempt::from_result(outcome)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedBackend;
    use super::*;
    use std::path::PathBuf;

    fn doc(name: &str, body: &str) -> Document {
        Document {
            key: name.to_string(),
            path: PathBuf::from(name),
            frontmatter: None,
            body: body.to_string(),
            size: body.len() as u64,
        }
    }

    fn fast_config() -> OracleConfig {
        OracleConfig {
            retry_base_delay_ms: 0,
            request_delay_ms: 0,
            ..OracleConfig::default()
        }
    }

    #[tokio::test]
    async fn classify_returns_validated_result() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "sleep.md",
            r#"{"category": "areas", "subcategory": "health", "tags": ["Sleep", "sleep"], "summary": "Sleep log"}"#,
        );
        let client = OracleClient::new(backend.clone(), Taxonomy::para(), &fast_config());

        let result = client.classify(&doc("sleep.md", "slept 8h")).await.unwrap();
        assert_eq!(result.category, "areas");
        assert_eq!(result.subcategory, "health");
        assert_eq!(result.tags, vec!["sleep"]);
        assert_eq!(result.title, "sleep");
        assert!(!result.truncated);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond_sequence(
            "a.md",
            vec![
                Err(OracleError::rate_limited("429")),
                Err(OracleError::network("timeout")),
                Ok(r#"{"category": "archive", "subcategory": "outdated"}"#.to_string()),
            ],
        );
        let client = OracleClient::new(backend.clone(), Taxonomy::para(), &fast_config());

        let result = client.classify(&doc("a.md", "old")).await.unwrap();
        assert_eq!(result.subcategory, "outdated");
        assert_eq!(backend.calls_for("a.md"), 3);
    }

    #[tokio::test]
    async fn retries_exhaust_with_last_cause() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond_sequence(
            "a.md",
            vec![Err(OracleError::rate_limited("429")); 10],
        );
        let client = OracleClient::new(backend.clone(), Taxonomy::para(), &fast_config());

        let err = client.classify(&doc("a.md", "x")).await.unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::RateLimited);
        // One initial attempt plus max_retries.
        assert_eq!(backend.calls_for("a.md"), 4);
    }

    #[tokio::test]
    async fn taxonomy_violation_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "d.md",
            r#"{"category": "areas", "subcategory": "gardening"}"#,
        );
        let client = OracleClient::new(backend.clone(), Taxonomy::para(), &fast_config());

        let err = client.classify(&doc("d.md", "tomatoes")).await.unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::InvalidResponse);
        assert_eq!(backend.calls_for("d.md"), 1);
    }

    #[tokio::test]
    async fn long_content_is_flagged_truncated() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "long.md",
            r#"{"category": "resources", "subcategory": "programming"}"#,
        );
        let config = OracleConfig {
            max_content_length: 10,
            ..fast_config()
        };
        let client = OracleClient::new(backend.clone(), Taxonomy::para(), &config);

        let result = client
            .classify(&doc("long.md", &"x".repeat(100)))
            .await
            .unwrap();
        assert!(result.truncated);
        let prompt = backend.prompts().pop().unwrap();
        assert!(prompt.contains("...[truncated]..."));
        assert!(!prompt.contains(&"x".repeat(11)));
    }
}
