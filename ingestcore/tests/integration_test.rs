//! Integration tests exercising the job store, worker pool, and incident
//! writer together through `recordstore`, without a live LLM provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ingestcore::domain::{ActorType, Incident, Job, Priority};
use ingestcore::incident_writer::{create_incident, ActorSpec, WriteRequest};
use ingestcore::job::{HandlerOutcome, JobHandler, JobStore, WorkerPool, WorkerPoolConfig};
use recordstore::Store;

struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        match job.job_type.as_str() {
            "boom" => HandlerOutcome::Failed {
                error: "simulated failure".to_string(),
                category: None,
            },
            _ => HandlerOutcome::Completed {
                message: Some(format!("handled {}", job.id)),
                items_processed: 1,
            },
        }
    }
}

#[tokio::test]
async fn test_job_store_enqueue_claim_complete_round_trip() {
    let store = Store::open_in_memory().expect("open in-memory store");
    let job_store = JobStore::spawn(store);

    let job_id = job_store
        .enqueue("extract_and_write", "extraction", serde_json::json!({"article_id": "a1"}), 3)
        .await
        .expect("enqueue");

    let claimed = job_store
        .claim_next("worker-1", vec!["extraction".to_string()])
        .await
        .expect("claim_next")
        .expect("a job should be claimable");
    assert_eq!(claimed.id, job_id);

    job_store
        .complete(&job_id, Some("ok".to_string()))
        .await
        .expect("complete");

    let nothing_left = job_store
        .claim_next("worker-1", vec!["extraction".to_string()])
        .await
        .expect("claim_next");
    assert!(nothing_left.is_none(), "queue should be drained");
}

#[tokio::test]
async fn test_worker_pool_drains_queue_and_stops_on_shutdown() {
    let store = Store::open_in_memory().expect("open in-memory store");
    let job_store = JobStore::spawn(store);

    for i in 0..3 {
        job_store
            .enqueue_with_priority("noop", "default", serde_json::json!({"n": i}), 0, Priority::Normal)
            .await
            .expect("enqueue");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let pool = WorkerPool::new(
        WorkerPoolConfig {
            worker_id: "test-worker".to_string(),
            queues: vec!["default".to_string()],
            max_concurrent: 2,
            poll_interval: Duration::from_millis(20),
        },
        job_store.clone(),
        Arc::new(EchoHandler),
    );

    let handle = tokio::spawn(pool.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(true).expect("shutdown channel open");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool should stop promptly")
        .expect("pool task should not panic");

    let remaining = job_store.claim_next("verifier", vec!["default".to_string()]).await.expect("claim_next");
    assert!(remaining.is_none(), "all three jobs should have been processed");
}

#[tokio::test]
async fn test_worker_pool_records_failure_without_crashing() {
    let store = Store::open_in_memory().expect("open in-memory store");
    let job_store = JobStore::spawn(store);

    let job_id = job_store
        .enqueue("boom", "default", serde_json::json!({}), 0)
        .await
        .expect("enqueue");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let pool = WorkerPool::new(
        WorkerPoolConfig {
            worker_id: "test-worker".to_string(),
            queues: vec!["default".to_string()],
            max_concurrent: 1,
            poll_interval: Duration::from_millis(20),
        },
        job_store.clone(),
        Arc::new(EchoHandler),
    );

    let handle = tokio::spawn(pool.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).expect("shutdown channel open");
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

    let job = job_store.get(&job_id).await.expect("get job").expect("job should still exist");
    assert_eq!(job.error.as_deref(), Some("simulated failure"));
}

#[test]
fn test_incident_writer_is_idempotent_across_reruns() {
    let store = Store::open_in_memory().expect("open in-memory store");

    let build_request = |article_id: &str| WriteRequest {
        extracted_data: serde_json::json!({"date": "2026-01-01", "state": "TX"}),
        article_id,
        domain_slug: "immigration_enforcement",
        confidence: 0.9,
        merge_info: None,
        schema_required_fields: &[],
        actors: vec![ActorSpec {
            name: "Jane Doe".to_string(),
            actor_type: ActorType::Person,
            role: Some("victim".to_string()),
        }],
        events: Vec::new(),
    };

    let first = create_incident(&store, build_request("article-42")).expect("first write succeeds");
    let second = create_incident(&store, build_request("article-42")).expect("second write succeeds");

    assert_eq!(first.incident_id, second.incident_id);
    assert_eq!(second.actors_created, 0, "actor should be reused, not recreated");

    let incidents: Vec<Incident> = store.list(&[], None).expect("list incidents");
    assert_eq!(incidents.len(), 1, "rerunning for the same article must not duplicate the incident");
}
