//! Job orchestration domain types (§3, §4.1, §4.13).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::priority::Priority;

/// Lifecycle state of a [`Job`] (§4.1 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A durable unit of work drained by the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub priority: Priority,
    pub params: Value,
    pub progress_current: u64,
    pub progress_total: u64,
    pub message: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub worker_task_id: Option<String>,
    pub queue: String,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Job {
    pub fn new(job_type: impl Into<String>, queue: impl Into<String>, params: Value, max_retries: u32) -> Self {
        Self::with_priority(job_type, queue, params, max_retries, Priority::Normal)
    }

    pub fn with_priority(
        job_type: impl Into<String>,
        queue: impl Into<String>,
        params: Value,
        max_retries: u32,
        priority: Priority,
    ) -> Self {
        let now = now_ms();
        Self {
            id: generate_id("job"),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            priority,
            params,
            progress_current: 0,
            progress_total: 0,
            message: None,
            error: None,
            retry_count: 0,
            max_retries,
            worker_task_id: None,
            queue: queue.into(),
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// A job is "owned" only once status is Running *and* a worker id is set (§4.1).
    pub fn is_owned(&self) -> bool {
        self.status == JobStatus::Running && self.worker_task_id.is_some()
    }

    pub fn is_stale(&self, now: i64, stale_timeout_ms: i64) -> bool {
        self.status == JobStatus::Running
            && self
                .started_at
                .map(|started| now - started > stale_timeout_ms)
                .unwrap_or(false)
    }
}

impl Record for Job {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "job"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("status", IndexValue::Text(self.status.to_string())),
            ("queue", IndexValue::Text(self.queue.clone())),
            ("job_type", IndexValue::Text(self.job_type.clone())),
            ("created_at", IndexValue::Int(self.created_at)),
            ("priority", IndexValue::Text(self.priority.to_string())),
        ]
    }
}

/// Append-only record of one job run, rolled up into [`TaskMetricAggregate`] (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetric {
    pub id: String,
    pub job_id: String,
    pub task_name: String,
    pub queue: String,
    pub status: JobStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub items_processed: u64,
    pub error: Option<String>,
    pub metadata: Value,
}

impl TaskMetric {
    pub fn new(job_id: impl Into<String>, task_name: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            id: generate_id("metric"),
            job_id: job_id.into(),
            task_name: task_name.into(),
            queue: queue.into(),
            status: JobStatus::Running,
            started_at: now_ms(),
            completed_at: None,
            duration_ms: None,
            items_processed: 0,
            error: None,
            metadata: Value::Null,
        }
    }

    pub fn finish(&mut self, status: JobStatus, items_processed: u64, error: Option<String>) {
        let now = now_ms();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some(now - self.started_at);
        self.items_processed = items_processed;
        self.error = error;
    }
}

impl Record for TaskMetric {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "task_metric"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("task_name", IndexValue::Text(self.task_name.clone())),
            ("status", IndexValue::Text(self.status.to_string())),
            ("started_at", IndexValue::Int(self.started_at)),
            (
                "completed_at",
                IndexValue::Int(self.completed_at.unwrap_or(i64::MAX)),
            ),
        ]
    }
}

/// Fixed-width period rollup of [`TaskMetric`] rows, keyed on `(period_start, task_name)` (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetricAggregate {
    pub id: String,
    pub period_start: i64,
    pub period_end: i64,
    pub task_name: String,
    pub total_runs: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub sum_items: u64,
}

impl TaskMetricAggregate {
    pub fn key(period_start: i64, task_name: &str) -> String {
        format!("{task_name}:{period_start}")
    }
}

impl Record for TaskMetricAggregate {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "task_metric_aggregate"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("task_name", IndexValue::Text(self.task_name.clone())),
            ("period_start", IndexValue::Int(self.period_start)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_and_unowned() {
        let job = Job::new("extract", "extraction", Value::Null, 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_owned());
    }

    #[test]
    fn owned_requires_both_running_and_worker_id() {
        let mut job = Job::new("extract", "extraction", Value::Null, 3);
        job.status = JobStatus::Running;
        assert!(!job.is_owned(), "running without worker id is not owned");
        job.worker_task_id = Some("w1".into());
        assert!(job.is_owned());
    }

    #[test]
    fn stale_detection_respects_timeout_and_status() {
        let mut job = Job::new("extract", "extraction", Value::Null, 3);
        job.status = JobStatus::Running;
        job.started_at = Some(1_000);
        assert!(job.is_stale(1_000 + 60_001, 60_000));
        assert!(!job.is_stale(1_000 + 59_999, 60_000));

        job.status = JobStatus::Pending;
        assert!(!job.is_stale(1_000 + 60_001, 60_000));
    }
}
