//! LLM error taxonomy (§4.4).

use thiserror::Error;

/// Category a raw provider exception is classified into (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    Partial,
}

/// A provider-agnostic error, normalized from whatever the adapter raised.
///
/// Callers branch on `category`, never on provider-specific exception types
/// (§4.4's central rule): a circuit breaker, a retry policy, or a job
/// handler inspects `category`/`retryable` and nothing else.
#[derive(Debug, Error)]
#[error("{category:?} error from {provider} ({error_code}): {message}")]
pub struct LlmError {
    pub category: ErrorCategory,
    pub error_code: String,
    pub message: String,
    pub provider: String,
    pub retryable: bool,
    pub status_code: Option<u16>,
}

impl LlmError {
    pub fn permanent(provider: impl Into<String>, error_code: impl Into<String>, message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            category: ErrorCategory::Permanent,
            error_code: error_code.into(),
            message: message.into(),
            provider: provider.into(),
            retryable: false,
            status_code,
        }
    }

    pub fn transient(provider: impl Into<String>, error_code: impl Into<String>, message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            category: ErrorCategory::Transient,
            error_code: error_code.into(),
            message: message.into(),
            provider: provider.into(),
            retryable: true,
            status_code,
        }
    }

    pub fn partial(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Partial,
            error_code: "json_parse_failure".to_string(),
            message: message.into(),
            provider: provider.into(),
            retryable: true,
            status_code: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
