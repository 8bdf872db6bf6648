//! Metrics Rollup: aggregates raw [`TaskMetric`] rows into 5-minute buckets
//! (§4.13).

use recordstore::{Filter, FilterOp, Store};

use crate::domain::{JobStatus, TaskMetric, TaskMetricAggregate};

const BUCKET_MS: i64 = 5 * 60 * 1000;

/// Floor `completed_at` to its enclosing 5-minute bucket start, matching
/// `date_trunc('hour', completed_at) + 5m*floor(minute/5)`.
pub fn bucket_start(completed_at_ms: i64) -> i64 {
    (completed_at_ms / BUCKET_MS) * BUCKET_MS
}

/// Roll up every `task_metrics` row with `completed_at > latest_period_end`
/// into 5-minute buckets, upserting on `(period_start, task_name)`.
///
/// Idempotent and monotonic by construction: re-running with the same input
/// recomputes the same bucket contents since the query is always bounded by
/// the same `completed_at` cutoff, and upsert overwrites rather than adds.
pub fn rollup(store: &Store, latest_period_end: i64) -> Result<usize, recordstore::StoreError> {
    let metrics: Vec<TaskMetric> = store
        .list(&[Filter::new("completed_at", FilterOp::Gt, latest_period_end)], None)?
        .into_iter()
        .filter(|m: &TaskMetric| m.completed_at.is_some())
        .collect();

    let mut buckets: std::collections::BTreeMap<(i64, String), Vec<TaskMetric>> = std::collections::BTreeMap::new();
    for metric in metrics {
        let completed_at = metric.completed_at.expect("filtered above");
        let key = (bucket_start(completed_at), metric.task_name.clone());
        buckets.entry(key).or_default().push(metric);
    }

    let mut updated = 0;
    for ((period_start, task_name), rows) in buckets {
        let existing = store.get::<TaskMetricAggregate>(&TaskMetricAggregate::key(period_start, &task_name))?;
        let aggregate = build_aggregate(existing, period_start, &task_name, &rows);
        store.update(&aggregate)?;
        updated += 1;
    }

    Ok(updated)
}

fn build_aggregate(
    existing: Option<TaskMetricAggregate>,
    period_start: i64,
    task_name: &str,
    rows: &[TaskMetric],
) -> TaskMetricAggregate {
    let mut durations: Vec<i64> = rows.iter().filter_map(|m| m.duration_ms).collect();
    durations.sort_unstable();

    let total_runs = rows.len() as u64;
    let successful = rows.iter().filter(|m| m.status == JobStatus::Completed).count() as u64;
    let failed = rows.iter().filter(|m| m.status == JobStatus::Failed).count() as u64;
    let sum_items: u64 = rows.iter().map(|m| m.items_processed).sum();

    let avg_duration_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };
    let p95_duration_ms = percentile(&durations, 0.95);

    TaskMetricAggregate {
        id: existing
            .map(|e| e.id)
            .unwrap_or_else(|| TaskMetricAggregate::key(period_start, task_name)),
        period_start,
        period_end: period_start + BUCKET_MS,
        task_name: task_name.to_string(),
        total_runs,
        successful,
        failed,
        avg_duration_ms,
        p95_duration_ms,
        sum_items,
    }
}

fn percentile(sorted: &[i64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(task_name: &str, completed_at: i64, duration_ms: i64, status: JobStatus) -> TaskMetric {
        TaskMetric {
            id: recordstore::generate_id("metric"),
            job_id: recordstore::generate_id("job"),
            task_name: task_name.to_string(),
            queue: "extraction".to_string(),
            status,
            started_at: completed_at - duration_ms,
            completed_at: Some(completed_at),
            duration_ms: Some(duration_ms),
            items_processed: 1,
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn bucket_start_floors_to_five_minutes() {
        let ts = 1_000 * 60 * 63 + 4_321; // 63 min 4.321s past epoch
        let bucket = bucket_start(ts);
        assert_eq!(bucket % BUCKET_MS, 0);
        assert!(bucket <= ts);
    }

    #[test]
    fn rollup_aggregates_rows_into_one_bucket() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_table::<TaskMetric>().unwrap();
        store.ensure_table::<TaskMetricAggregate>().unwrap();

        let base = bucket_start(10_000_000);
        for i in 0..3 {
            let m = metric("extract", base + i * 1000, 200 + i * 10, JobStatus::Completed);
            store.insert(&m).unwrap();
        }
        let failed = metric("extract", base + 500, 9999, JobStatus::Failed);
        store.insert(&failed).unwrap();

        let updated = rollup(&store, 0).unwrap();
        assert_eq!(updated, 1);

        let agg = store
            .get::<TaskMetricAggregate>(&TaskMetricAggregate::key(base, "extract"))
            .unwrap()
            .unwrap();
        assert_eq!(agg.total_runs, 4);
        assert_eq!(agg.successful, 3);
        assert_eq!(agg.failed, 1);
    }

    #[test]
    fn rollup_is_idempotent_under_rerun() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_table::<TaskMetric>().unwrap();
        store.ensure_table::<TaskMetricAggregate>().unwrap();

        let base = bucket_start(20_000_000);
        store.insert(&metric("extract", base, 100, JobStatus::Completed)).unwrap();

        rollup(&store, 0).unwrap();
        let first = store
            .get::<TaskMetricAggregate>(&TaskMetricAggregate::key(base, "extract"))
            .unwrap()
            .unwrap();

        rollup(&store, 0).unwrap();
        let second = store
            .get::<TaskMetricAggregate>(&TaskMetricAggregate::key(base, "extract"))
            .unwrap()
            .unwrap();

        assert_eq!(first.total_runs, second.total_runs);
        assert_eq!(first.avg_duration_ms, second.avg_duration_ms);
    }
}
