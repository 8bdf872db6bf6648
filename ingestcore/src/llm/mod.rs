//! LLM client subsystem: providers, error classification, circuit breaking,
//! and fallback routing (§4.3, §4.4, §4.5).

mod circuit_breaker;
mod classifier;
mod error;
mod provider;
mod router;
mod transport;
mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSummary, TripRecord};
pub use classifier::{classify_http_error, classify_json_parse_failure, classify_transport_error};
pub use error::{ErrorCategory, LlmError, TransportError};
pub use provider::{AnthropicProvider, LlmProvider, OpenAiCompatibleProvider};
pub use router::{Router, StageOverride};
pub use types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};

#[cfg(test)]
pub use provider::mock;
