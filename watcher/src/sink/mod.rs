//! Outbound calls to external services with a shared retry policy.
//!
//! Only rate limiting (HTTP 429) is treated as transient: the call is retried
//! after a fixed backoff until `max_attempts` is reached. Every other
//! non-success status, and any transport error, is terminal.

pub mod captioning;
pub mod http;
pub mod telemetry;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use scene_watch_common::config::RetryConfig;
use tracing::{debug, error, warn};

pub use captioning::CaptionClient;
pub use http::HttpEndpoint;
pub use telemetry::TelemetryClient;

const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Status, headers of interest and body of one service response.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            content_type: content_type.map(str::to_owned),
            content_length: Some(body.len() as u64),
            body,
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Service-provided error message: `error.message` from a JSON body,
    /// otherwise the start of the body as text.
    fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
        }
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(200).collect()
    }

    /// Interpret a successful response body.
    fn into_reply(self) -> Result<Reply, SinkError> {
        if self.content_length == Some(0) || self.body.is_empty() {
            return Ok(Reply::Empty);
        }
        let content_type = self
            .content_type
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if content_type.contains("application/json") {
            let value = serde_json::from_slice(&self.body)
                .map_err(|e| SinkError::Malformed(format!("invalid JSON body: {e}")))?;
            Ok(Reply::Json(value))
        } else if content_type.contains("image") {
            Ok(Reply::Image(self.body))
        } else {
            Ok(Reply::Empty)
        }
    }
}

/// Decoded body of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Json(serde_json::Value),
    Image(Bytes),
}

impl Reply {
    pub fn describe(&self) -> &'static str {
        match self {
            Reply::Empty => "empty body",
            Reply::Json(_) => "JSON body",
            Reply::Image(_) => "image body",
        }
    }
}

/// A single POST target. Implementations perform exactly one request per call.
pub trait Endpoint: Send + Sync + 'static {
    fn post(
        &self,
        body: Bytes,
        content_type: &'static str,
    ) -> impl Future<Output = Result<RawResponse, SinkError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

/// Wraps an [`Endpoint`] with the rate-limit retry policy.
#[derive(Clone)]
pub struct RetryingClient<E> {
    endpoint: E,
    policy: RetryPolicy,
    service: &'static str,
}

impl<E: Endpoint> RetryingClient<E> {
    pub fn new(service: &'static str, endpoint: E, policy: RetryPolicy) -> Self {
        Self {
            endpoint,
            policy,
            service,
        }
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub async fn call(&self, body: Bytes, content_type: &'static str) -> Result<Reply, SinkError> {
        let mut attempt: u32 = 1;
        loop {
            let response = self.endpoint.post(body.clone(), content_type).await?;

            if response.status == STATUS_TOO_MANY_REQUESTS {
                let service_message = response.error_message();
                if attempt >= self.policy.max_attempts {
                    error!(
                        service = self.service,
                        attempts = attempt,
                        service_message,
                        "rate limited, giving up after retrying"
                    );
                    return Err(SinkError::RetriesExhausted { attempts: attempt });
                }
                warn!(
                    service = self.service,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    backoff_ms = self.policy.backoff.as_millis() as u64,
                    service_message,
                    "rate limited, backing off"
                );
                tokio::time::sleep(self.policy.backoff).await;
                attempt += 1;
                continue;
            }

            if !response.is_success() {
                return Err(SinkError::Status {
                    code: response.status,
                    message: response.error_message(),
                });
            }

            debug!(service = self.service, status = response.status, attempt, "call succeeded");
            return response.into_reply();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("still rate limited after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("service returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("failed to encode request: {0}")]
    Encode(String),
}
