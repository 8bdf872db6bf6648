//! Scheduler: periodic triggers that enqueue jobs rather than executing
//! inline, decoupling scheduling from execution (§4.2).
//!
//! The self-throttling rate limiter is a [SUPPLEMENT]: LLM-bound job types
//! (`batch_extract`, `enrich`) absorb provider `Retry-After` hints via a
//! sliding window so the breaker (§4.5) trips on genuine failures, not on
//! calls the scheduler could have paced out itself.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::store::{JobStore, JobStoreResult};

#[derive(Debug, Clone)]
pub struct Trigger {
    pub job_type: &'static str,
    pub queue: &'static str,
    pub interval: Duration,
}

/// Scheduler trigger table (§4.2): fetch hourly, stale-job sweep every
/// 15 min, metrics rollup every 5 min, materialized-view refresh every 6 h.
pub const TRIGGERS: &[Trigger] = &[
    Trigger {
        job_type: "fetch",
        queue: "fetch",
        interval: Duration::from_secs(3600),
    },
    Trigger {
        job_type: "stale_job_sweep",
        queue: "maintenance",
        interval: Duration::from_secs(15 * 60),
    },
    Trigger {
        job_type: "metrics_rollup",
        queue: "maintenance",
        interval: Duration::from_secs(5 * 60),
    },
    Trigger {
        job_type: "materialized_view_refresh",
        queue: "maintenance",
        interval: Duration::from_secs(6 * 3600),
    },
];

pub struct Scheduler {
    store: JobStore,
    rate_limiter: Mutex<SlidingWindowLimiter>,
}

impl Scheduler {
    pub fn new(store: JobStore, max_calls_per_window: usize, window: Duration) -> Self {
        Self {
            store,
            rate_limiter: Mutex::new(SlidingWindowLimiter::new(max_calls_per_window, window)),
        }
    }

    /// Run forever, firing each trigger on its own interval by enqueueing a
    /// job (never executing the work inline).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut intervals: Vec<_> = TRIGGERS.iter().map(|t| tokio::time::interval(t.interval)).collect();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let fired = futures::future::select_all(intervals.iter_mut().map(|i| Box::pin(i.tick())));
            tokio::select! {
                (_, idx, _) = fired => {
                    let trigger = &TRIGGERS[idx];
                    if let Err(err) = self.fire(trigger).await {
                        tracing::error!(job_type = trigger.job_type, %err, "scheduler: failed to enqueue trigger job");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        info!("scheduler stopped");
    }

    async fn fire(&self, trigger: &Trigger) -> JobStoreResult<String> {
        debug!(job_type = trigger.job_type, queue = trigger.queue, "scheduler: firing trigger");
        self.store.enqueue(trigger.job_type, trigger.queue, json!({}), 3).await
    }

    /// Absorb a provider `Retry-After` hint into the rate limiter so the
    /// next call self-throttles instead of immediately re-tripping a 429.
    pub async fn record_retry_after(&self, retry_after: Duration) {
        self.rate_limiter.lock().await.note_retry_after(retry_after);
    }

    /// Returns the delay the caller should wait before making another LLM
    /// call, honoring both the sliding window and any recorded Retry-After.
    pub async fn admission_delay(&self) -> Duration {
        self.rate_limiter.lock().await.admission_delay()
    }

    pub async fn record_call(&self) {
        self.rate_limiter.lock().await.record_call();
    }
}

/// Sliding-window call limiter: at most `max_calls` within `window`, plus an
/// optional hard floor from a provider's `Retry-After` header.
struct SlidingWindowLimiter {
    max_calls: usize,
    window: Duration,
    calls: VecDeque<std::time::Instant>,
    retry_after_until: Option<std::time::Instant>,
}

impl SlidingWindowLimiter {
    fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: VecDeque::new(),
            retry_after_until: None,
        }
    }

    fn note_retry_after(&mut self, retry_after: Duration) {
        let until = std::time::Instant::now() + retry_after;
        self.retry_after_until = Some(match self.retry_after_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    fn record_call(&mut self) {
        self.calls.push_back(std::time::Instant::now());
    }

    fn admission_delay(&mut self) -> Duration {
        let now = std::time::Instant::now();

        if let Some(until) = self.retry_after_until {
            if until > now {
                return until - now;
            }
            self.retry_after_until = None;
        }

        while let Some(oldest) = self.calls.front() {
            if now.duration_since(*oldest) > self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }

        if self.calls.len() < self.max_calls {
            Duration::ZERO
        } else {
            let oldest = *self.calls.front().unwrap();
            self.window.saturating_sub(now.duration_since(oldest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_admits_freely_under_the_cap() {
        let mut limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        limiter.record_call();
        limiter.record_call();
        assert_eq!(limiter.admission_delay(), Duration::ZERO);
    }

    #[test]
    fn sliding_window_throttles_once_cap_reached() {
        let mut limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        limiter.record_call();
        limiter.record_call();
        assert!(limiter.admission_delay() > Duration::ZERO);
    }

    #[test]
    fn retry_after_floor_dominates_until_it_elapses() {
        let mut limiter = SlidingWindowLimiter::new(100, Duration::from_secs(60));
        limiter.note_retry_after(Duration::from_millis(50));
        assert!(limiter.admission_delay() > Duration::ZERO);
    }

    #[tokio::test]
    async fn fire_enqueues_a_job_rather_than_executing_inline() {
        let store = JobStore::spawn(recordstore::Store::open_in_memory().unwrap());
        let scheduler = Scheduler::new(store.clone(), 10, Duration::from_secs(60));
        scheduler.fire(&TRIGGERS[0]).await.unwrap();

        let claimed = store.claim_next("w1", vec!["fetch".to_string()]).await.unwrap();
        assert!(claimed.is_some());
    }
}
