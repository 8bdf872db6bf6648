//! Maps raw provider exceptions to classified [`LlmError`]s (§4.4).

use super::error::LlmError;

/// Classify a raw HTTP status + response body into an [`LlmError`].
///
/// - 401/403 (including credit-exhausted) and 400 are permanent, non-retryable.
/// - 429 and 5xx are transient, retryable.
/// - Anything else fails open to transient, per the spec's "unknown → retry" rule.
pub fn classify_http_error(provider: &str, status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::permanent(provider, format!("http_{status}"), body, Some(status)),
        400 => LlmError::permanent(provider, "http_400", body, Some(status)),
        429 => LlmError::transient(provider, "rate_limited", body, Some(status)),
        500..=599 => LlmError::transient(provider, format!("http_{status}"), body, Some(status)),
        _ => LlmError::transient(provider, format!("http_{status}"), body, Some(status)),
    }
}

/// Classify a transport-level failure (connection reset, timeout) as transient.
pub fn classify_transport_error(provider: &str, message: impl Into<String>) -> LlmError {
    LlmError::transient(provider, "transport_error", message, None)
}

/// Classify a JSON parse failure of model output (§4.4: partial, retryable once).
pub fn classify_json_parse_failure(provider: &str, message: impl Into<String>) -> LlmError {
    LlmError::partial(provider, message)
}
