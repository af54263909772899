//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Error for a transport failure of `reqwest`
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            LlmError::network(format!("Connection failed: {e}"))
        } else {
            LlmError::unknown(format!("Request failed: {e}"))
        }
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl LlmErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

/// Classify a non-success HTTP response from its status and body
pub fn classify_status(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = error_message(body);
    match status.as_u16() {
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => {
            let mut err = LlmError::rate_limit(format!("Rate limited: {message}"));
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
                if let Some(retry_after) = parsed
                    .get("error")
                    .and_then(|e| e.get("retry_after"))
                    .and_then(serde_json::Value::as_f64)
                {
                    err = err.with_retry_after(Duration::from_secs_f64(retry_after));
                }
            }
            err
        }
        400 | 404 | 422 => LlmError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the body
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
