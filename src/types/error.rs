//! Unified Error Type System
//!
//! Centralized error types for the orchestration layer.
//! Every provider failure is reduced to an [`ErrorKind`] that drives the
//! retry and failover decisions of the call executor.
//!
//! ## Error Kinds
//!
//! - **Configuration**: No usable provider (fatal, never retried)
//! - **Authentication**: Bad credentials (not retried)
//! - **RateLimit**: Retried after the provider-supplied delay
//! - **Network / Timeout**: Retried with exponential backoff
//! - **ContextOverflow**: Prompt cannot fit the model window (fail over)
//! - **InvalidResponse**: Empty or unparseable output (retried once)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Classified failure kinds used for retry and failover routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable provider configured
    Configuration,
    /// Credentials rejected by the backend
    Authentication,
    /// Backend throttled the request
    RateLimit,
    /// Connectivity failure
    Network,
    /// Attempt exceeded its deadline
    Timeout,
    /// Prompt cannot fit into the model window
    ContextOverflow,
    /// Empty or unparseable content
    InvalidResponse,
    /// Malformed request (4xx other than auth/rate limit)
    BadRequest,
    /// 5xx from the backend
    ServerError,
    /// Anything unrecognized
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ContextOverflow => "context_overflow",
            Self::InvalidResponse => "invalid_response",
            Self::BadRequest => "bad_request",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the same provider may be called again for this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::Network
                | Self::Timeout
                | Self::InvalidResponse
                | Self::ServerError
                | Self::Unknown
        )
    }

    /// Whether the request must stop without trying other providers
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration | Self::BadRequest)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Classified provider error with retry hints
#[derive(Debug, Clone, PartialEq)]
pub struct LlmError {
    /// Kind used for routing decisions
    pub kind: ErrorKind,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Backend-supplied wait before retrying
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        kind: ErrorKind,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new(kind, message).provider(provider)
    }

    /// Add provider context to an existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach a backend-supplied retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("attempt timed out after {}ms", duration.as_millis()),
        )
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw provider failures onto [`ErrorKind`]s
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        let kind = if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            ErrorKind::RateLimit
        } else if lower.contains("context length")
            || lower.contains("context window")
            || lower.contains("maximum context")
            || (lower.contains("token") && lower.contains("exceed"))
        {
            ErrorKind::ContextOverflow
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
        {
            ErrorKind::Authentication
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ErrorKind::Timeout
        } else if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            ErrorKind::Network
        } else if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("overloaded")
            || lower.contains("service unavailable")
        {
            ErrorKind::ServerError
        } else if lower.contains("400") || lower.contains("bad request") || lower.contains("malformed")
        {
            ErrorKind::BadRequest
        } else if lower.contains("parse") || lower.contains("json") || lower.contains("empty") {
            ErrorKind::InvalidResponse
        } else {
            ErrorKind::Unknown
        };

        let mut err = LlmError::with_provider(kind, message, provider);
        if kind == ErrorKind::RateLimit
            && let Some(delay) = parse_retry_after_hint(message)
        {
            err = err.retry_after(delay);
        }
        err
    }

    /// Classify an HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(
        status: u16,
        message: &str,
        provider: &str,
        retry_after: Option<Duration>,
    ) -> LlmError {
        let kind = match status {
            429 => ErrorKind::RateLimit,
            401 | 403 => ErrorKind::Authentication,
            408 => ErrorKind::Timeout,
            413 => ErrorKind::ContextOverflow,
            400 | 404 | 405 | 415 | 422 => {
                // Several vendors report window overflow as a plain 400.
                let lower = message.to_lowercase();
                if lower.contains("context") || lower.contains("too many tokens") {
                    ErrorKind::ContextOverflow
                } else {
                    ErrorKind::BadRequest
                }
            }
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        };

        let mut err = LlmError::with_provider(kind, message, provider);
        if let Some(delay) = retry_after {
            err = err.retry_after(delay);
        } else if kind == ErrorKind::RateLimit
            && let Some(delay) = parse_retry_after_hint(message)
        {
            err = err.retry_after(delay);
        }
        err
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> LlmError {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ErrorKind::Network
        } else if err.is_decode() {
            ErrorKind::InvalidResponse
        } else {
            ErrorKind::Unknown
        };
        LlmError::with_provider(kind, err.to_string(), provider)
    }
}

/// Parse a retry-after delay from a free-form error message.
///
/// Accepts "retry after N seconds", "retry-after: N" and "wait N seconds".
pub fn parse_retry_after_hint(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();

    for marker in ["retry", "wait "] {
        if let Some(idx) = lower.find(marker) {
            let tail = &lower[idx..];
            for word in tail.split(|c: char| c.is_whitespace() || c == ':') {
                let word = word.trim_end_matches(|c: char| !c.is_ascii_digit());
                if let Ok(secs) = word.parse::<u64>() {
                    return Some(Duration::from_secs(secs));
                }
            }
        }
    }

    None
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PlanwrightError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structured provider error with kind and retry hints
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Context overflow: prompt needs {required} tokens but only {budget} are available")]
    ContextOverflow { required: usize, budget: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for PlanwrightError {
    fn from(err: LlmError) -> Self {
        PlanwrightError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, PlanwrightError>;

impl PlanwrightError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Reduce any application error to a classified provider error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Llm(e) => e.kind,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ContextOverflow { .. } => ErrorKind::ContextOverflow,
            Self::Config(_) | Self::NotInitialized(_) => ErrorKind::Configuration,
            Self::Json(_) => ErrorKind::InvalidResponse,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn into_llm_error(self, provider: &str) -> LlmError {
        match self {
            Self::Llm(e) if e.provider.is_some() => e,
            Self::Llm(e) => e.provider(provider),
            other => LlmError::with_provider(other.kind(), other.to_string(), provider),
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| PlanwrightError::Storage(format!("{}: {}", context.into(), e)))
    }}

// =============================================================================
// Tests
// =============================================================================
