//! Job Store: actor that owns the job/task-metric tables (§4.1).
//!
//! Follows the teacher's `StateManager` pattern: a single task owns the
//! `recordstore::Store` exclusively and processes commands sent over an
//! mpsc channel, so two handlers can never interleave writes to the same
//! job row (§4.1's single-writer acknowledgement discipline, §8).

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use recordstore::{Filter, Store};

use crate::domain::{Job, JobStatus, Priority, TaskMetric};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("store error: {0}")]
    Store(#[from] recordstore::StoreError),
    #[error("job store actor is no longer running")]
    ChannelClosed,
    #[error("job not found: {0}")]
    NotFound(String),
}

pub type JobStoreResult<T> = Result<T, JobStoreError>;

enum Command {
    Enqueue {
        job: Job,
        reply: oneshot::Sender<JobStoreResult<String>>,
    },
    ClaimNext {
        worker_id: String,
        queues: Vec<String>,
        reply: oneshot::Sender<JobStoreResult<Option<Job>>>,
    },
    ReportProgress {
        job_id: String,
        current: u64,
        total: u64,
        message: Option<String>,
        reply: oneshot::Sender<JobStoreResult<()>>,
    },
    Complete {
        job_id: String,
        message: Option<String>,
        reply: oneshot::Sender<JobStoreResult<()>>,
    },
    Fail {
        job_id: String,
        error: String,
        reply: oneshot::Sender<JobStoreResult<()>>,
    },
    WatchdogSweep {
        now: i64,
        stale_timeout_ms: i64,
        reply: oneshot::Sender<JobStoreResult<WatchdogReport>>,
    },
    Get {
        job_id: String,
        reply: oneshot::Sender<JobStoreResult<Option<Job>>>,
    },
    RecordMetric {
        metric: TaskMetric,
        reply: oneshot::Sender<JobStoreResult<()>>,
    },
}

#[derive(Debug, Default, Clone)]
pub struct WatchdogReport {
    pub reclaimed: Vec<String>,
    pub failed: Vec<String>,
}

/// Handle to the Job Store actor. Cheap to clone; every clone shares the
/// same underlying store.
#[derive(Clone)]
pub struct JobStore {
    tx: mpsc::Sender<Command>,
}

impl JobStore {
    pub fn spawn(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        Self { tx }
    }

    pub async fn enqueue(&self, job_type: impl Into<String>, queue: impl Into<String>, params: serde_json::Value, max_retries: u32) -> JobStoreResult<String> {
        self.enqueue_with_priority(job_type, queue, params, max_retries, Priority::Normal).await
    }

    pub async fn enqueue_with_priority(
        &self,
        job_type: impl Into<String>,
        queue: impl Into<String>,
        params: serde_json::Value,
        max_retries: u32,
        priority: Priority,
    ) -> JobStoreResult<String> {
        let job = Job::with_priority(job_type, queue, params, max_retries, priority);
        debug!(job_id = %job.id, "enqueue: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Enqueue { job, reply })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    /// Claim the highest-priority oldest pending job across `queues`, or
    /// `None` if nothing is pending. Transitions pending -> running and sets
    /// `worker_task_id` atomically within the actor.
    pub async fn claim_next(&self, worker_id: impl Into<String>, queues: Vec<String>) -> JobStoreResult<Option<Job>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ClaimNext {
                worker_id: worker_id.into(),
                queues,
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    pub async fn report_progress(&self, job_id: impl Into<String>, current: u64, total: u64, message: Option<String>) -> JobStoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ReportProgress {
                job_id: job_id.into(),
                current,
                total,
                message,
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    pub async fn complete(&self, job_id: impl Into<String>, message: Option<String>) -> JobStoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Complete {
                job_id: job_id.into(),
                message,
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    pub async fn fail(&self, job_id: impl Into<String>, error: impl Into<String>) -> JobStoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Fail {
                job_id: job_id.into(),
                error: error.into(),
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    /// Reclaim stale running jobs back to pending (retry_count < max_retries)
    /// or fail them outright otherwise (§4.1 watchdog).
    pub async fn watchdog_sweep(&self, now: i64, stale_timeout_ms: i64) -> JobStoreResult<WatchdogReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::WatchdogSweep {
                now,
                stale_timeout_ms,
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    pub async fn get(&self, job_id: impl Into<String>) -> JobStoreResult<Option<Job>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Get {
                job_id: job_id.into(),
                reply,
            })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }

    pub async fn record_metric(&self, metric: TaskMetric) -> JobStoreResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RecordMetric { metric, reply })
            .await
            .map_err(|_| JobStoreError::ChannelClosed)?;
        rx.await.map_err(|_| JobStoreError::ChannelClosed)?
    }
}

async fn actor_loop(store: Store, mut rx: mpsc::Receiver<Command>) {
    info!("job store actor started");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Enqueue { job, reply } => {
                let result = store.insert(&job).map(|_| job.id).map_err(JobStoreError::from);
                let _ = reply.send(result);
            }
            Command::ClaimNext { worker_id, queues, reply } => {
                let result = claim_next(&store, &worker_id, &queues);
                let _ = reply.send(result);
            }
            Command::ReportProgress {
                job_id,
                current,
                total,
                message,
                reply,
            } => {
                let result = (|| -> JobStoreResult<()> {
                    let mut job = store.get::<Job>(&job_id)?.ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;
                    job.progress_current = current;
                    job.progress_total = total;
                    job.message = message;
                    store.update(&job)?;
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            Command::Complete { job_id, message, reply } => {
                let result = (|| -> JobStoreResult<()> {
                    let mut job = store.get::<Job>(&job_id)?.ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;
                    job.status = JobStatus::Completed;
                    job.message = message;
                    job.completed_at = Some(recordstore::now_ms());
                    store.update(&job)?;
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            Command::Fail { job_id, error, reply } => {
                let result = (|| -> JobStoreResult<()> {
                    let mut job = store.get::<Job>(&job_id)?.ok_or_else(|| JobStoreError::NotFound(job_id.clone()))?;
                    job.status = JobStatus::Failed;
                    job.error = Some(error);
                    job.completed_at = Some(recordstore::now_ms());
                    store.update(&job)?;
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            Command::WatchdogSweep {
                now,
                stale_timeout_ms,
                reply,
            } => {
                let result = watchdog_sweep(&store, now, stale_timeout_ms);
                let _ = reply.send(result);
            }
            Command::Get { job_id, reply } => {
                let result = store.get::<Job>(&job_id).map_err(JobStoreError::from);
                let _ = reply.send(result);
            }
            Command::RecordMetric { metric, reply } => {
                let result = store.insert(&metric).map_err(JobStoreError::from);
                let _ = reply.send(result);
            }
        }
    }
    info!("job store actor stopped");
}

fn claim_next(store: &Store, worker_id: &str, queues: &[String]) -> JobStoreResult<Option<Job>> {
    let mut candidates: Vec<Job> = Vec::new();
    for queue in queues {
        let filters = [Filter::eq("queue", queue.as_str()), Filter::eq("status", JobStatus::Pending.to_string())];
        candidates.extend(store.list::<Job>(&filters, None)?);
    }

    // Highest priority first, then oldest first within a priority tier (FIFO fairness).
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

    let Some(mut job) = candidates.into_iter().next() else {
        return Ok(None);
    };

    job.status = JobStatus::Running;
    job.worker_task_id = Some(worker_id.to_string());
    job.started_at = Some(recordstore::now_ms());
    store.update(&job)?;
    Ok(Some(job))
}

fn watchdog_sweep(store: &Store, now: i64, stale_timeout_ms: i64) -> JobStoreResult<WatchdogReport> {
    let running = store.list::<Job>(&[Filter::eq("status", JobStatus::Running.to_string())], None)?;
    let mut report = WatchdogReport::default();

    for mut job in running {
        if !job.is_stale(now, stale_timeout_ms) {
            continue;
        }

        if job.retry_count < job.max_retries {
            job.status = JobStatus::Pending;
            job.worker_task_id = None;
            job.started_at = None;
            job.retry_count += 1;
            store.update(&job)?;
            report.reclaimed.push(job.id.clone());
            warn!(job_id = %job.id, retry_count = job.retry_count, "watchdog: reclaimed stale job to pending");
        } else {
            job.status = JobStatus::Failed;
            job.error = Some("worker crash detected (stale timeout)".to_string());
            job.completed_at = Some(now);
            store.update(&job)?;
            report.failed.push(job.id.clone());
            warn!(job_id = %job.id, "watchdog: stale job exceeded max_retries, marked failed");
        }
    }

    Ok(report)
}
