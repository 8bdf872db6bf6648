//! Per-batch circuit breaker (§4.5).

use super::error::{ErrorCategory, LlmError};

#[derive(Debug, Clone)]
pub struct TripRecord {
    pub article_id: String,
    pub error_code: String,
    pub trip_reason: String,
}

/// Tracks errors within one batch run and trips when the failure pattern
/// suggests continuing would waste calls against a broken provider.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    tripped: bool,
    trip: Option<TripRecord>,
    last_transient_code: Option<String>,
    consecutive_transient: u32,
    error_count: u32,
    success_count: u32,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Record an error; returns `true` if this call caused the breaker to
    /// trip (it was not already tripped beforehand).
    pub fn record_error(&mut self, err: &LlmError, article_id: &str) -> bool {
        self.error_count += 1;
        let was_tripped = self.tripped;

        match err.category {
            ErrorCategory::Permanent => {
                self.consecutive_transient = 0;
                self.trip(article_id, &err.error_code, "permanent error");
            }
            ErrorCategory::Transient | ErrorCategory::Partial => {
                if self.last_transient_code.as_deref() == Some(err.error_code.as_str()) {
                    self.consecutive_transient += 1;
                } else {
                    self.consecutive_transient = 1;
                    self.last_transient_code = Some(err.error_code.clone());
                }
                if self.consecutive_transient >= 3 {
                    self.trip(
                        article_id,
                        &err.error_code,
                        "three consecutive identical transient errors",
                    );
                }
            }
        }

        !was_tripped && self.tripped
    }

    /// A success resets the consecutive-transient counter but never
    /// un-trips an already-tripped breaker (§4.5).
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_transient = 0;
        self.last_transient_code = None;
    }

    fn trip(&mut self, article_id: &str, error_code: &str, reason: &str) {
        if self.tripped {
            return;
        }
        self.tripped = true;
        self.trip = Some(TripRecord {
            article_id: article_id.to_string(),
            error_code: error_code.to_string(),
            trip_reason: reason.to_string(),
        });
    }

    pub fn summary(&self) -> CircuitBreakerSummary {
        CircuitBreakerSummary {
            tripped: self.tripped,
            trip: self.trip.clone(),
            error_count: self.error_count,
            success_count: self.success_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSummary {
    pub tripped: bool,
    pub trip: Option<TripRecord>,
    pub error_count: u32,
    pub success_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(code: &str) -> LlmError {
        LlmError::transient("anthropic", code, "boom", None)
    }

    fn permanent(code: &str) -> LlmError {
        LlmError::permanent("anthropic", code, "boom", None)
    }

    #[test]
    fn permanent_error_trips_immediately() {
        let mut breaker = CircuitBreaker::new();
        assert!(breaker.record_error(&permanent("http_401"), "article_1"));
        assert!(breaker.is_tripped());
    }

    #[test]
    fn three_consecutive_identical_transient_errors_trip_on_the_third() {
        let mut breaker = CircuitBreaker::new();
        assert!(!breaker.record_error(&transient("rate_limited"), "a1"));
        assert!(!breaker.record_error(&transient("rate_limited"), "a2"));
        assert!(breaker.record_error(&transient("rate_limited"), "a3"));
        assert!(breaker.is_tripped());
    }

    #[test]
    fn differing_transient_codes_do_not_accumulate() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_error(&transient("rate_limited"), "a1");
        breaker.record_error(&transient("timeout"), "a2");
        breaker.record_error(&transient("rate_limited"), "a3");
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn success_resets_consecutive_counter_but_not_trip_state() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_error(&transient("rate_limited"), "a1");
        breaker.record_error(&transient("rate_limited"), "a2");
        breaker.record_success();
        breaker.record_error(&transient("rate_limited"), "a3");
        assert!(!breaker.is_tripped(), "counter should have reset after success");

        breaker.record_error(&permanent("http_401"), "a4");
        assert!(breaker.is_tripped());
        breaker.record_success();
        assert!(breaker.is_tripped(), "success never un-trips an already-tripped breaker");
    }

    #[test]
    fn summary_reports_trip_reason() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_error(&permanent("http_403"), "a1");
        let summary = breaker.summary();
        assert!(summary.tripped);
        assert_eq!(summary.trip.unwrap().error_code, "http_403");
    }
}
