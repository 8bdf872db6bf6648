//! Worker Pool: bounded-concurrency job execution (§4.2).
//!
//! Each claimed job runs `mark_started -> handler -> mark_completed|failed`
//! and records a [`TaskMetric`], mirroring the teacher's `LoopManager`
//! semaphore-gated spawn pattern generalized from loops to jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::domain::{Job, TaskMetric};
use crate::llm::ErrorCategory;

use super::store::JobStore;

/// A job handler executes one job's business logic. Permanent failures
/// should surface via `HandlerOutcome::Permanent` so the pool never retries
/// them regardless of `max_retries` (§4.2: "permanent LLM errors never retry").
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> HandlerOutcome;
}

pub enum HandlerOutcome {
    Completed { message: Option<String>, items_processed: u64 },
    Failed { error: String, category: Option<ErrorCategory> },
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_id: String,
    pub queues: Vec<String>,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    store: JobStore,
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, store: JobStore, handler: Arc<dyn JobHandler>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            store,
            handler,
            semaphore,
        }
    }

    /// Poll for jobs until `shutdown` resolves, running each under a
    /// semaphore permit so the pool never exceeds `max_concurrent`.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(worker_id = %self.config.worker_id, queues = ?self.config.queues, "worker pool started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.store.claim_next(self.config.worker_id.clone(), self.config.queues.clone()).await {
                Ok(Some(job)) => {
                    let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    let store = self.store.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        run_one(store, handler, job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    error!(%err, "worker pool: claim_next failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        info!(worker_id = %self.config.worker_id, "worker pool stopped");
    }
}

/// Runs a single job handler to completion and records its outcome. This is
/// the "sync-entry, async-inside" unit the spec describes: one job occupies
/// one task for its whole lifetime, and a handler panic is caught so it
/// cannot take down the pool (§4.1's "crash the current loop cleanly").
async fn run_one(store: JobStore, handler: Arc<dyn JobHandler>, job: Job) {
    let mut metric = TaskMetric::new(&job.id, &job.job_type, &job.queue);

    let outcome = std::panic::AssertUnwindSafe(handler.handle(&job))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| HandlerOutcome::Failed {
            error: "handler panicked".to_string(),
            category: None,
        });

    match outcome {
        HandlerOutcome::Completed { message, items_processed } => {
            metric.finish(crate::domain::JobStatus::Completed, items_processed, None);
            if let Err(err) = store.complete(&job.id, message).await {
                error!(job_id = %job.id, %err, "failed to mark job completed");
            }
        }
        HandlerOutcome::Failed { error, category } => {
            metric.finish(crate::domain::JobStatus::Failed, 0, Some(error.clone()));
            if matches!(category, Some(ErrorCategory::Permanent)) {
                warn!(job_id = %job.id, "permanent error, not eligible for retry");
            }
            if let Err(err) = store.fail(&job.id, error).await {
                error!(job_id = %job.id, %err, "failed to mark job failed");
            }
        }
    }

    if let Err(err) = store.record_metric(metric).await {
        error!(job_id = %job.id, %err, "failed to record task metric");
    }
}

use futures::FutureExt;
