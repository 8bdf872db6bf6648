//! Article ingest pipeline worker entry point (§6.5).

use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use ingestcore::cli::{Cli, Command};
use ingestcore::config::Config;
use ingestcore::domain::Priority;
use ingestcore::job::{JobStore, Scheduler, WorkerPool, WorkerPoolConfig};
use ingestcore::llm::{AnthropicProvider, LlmProvider, OpenAiCompatibleProvider, Router};
use ingestcore::PipelineHandler;
use recordstore::Store;

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn build_router(config: &Config) -> Router {
    let primary: Arc<dyn LlmProvider> = if let Some(key) = &config.llm.anthropic_api_key {
        Arc::new(AnthropicProvider::new(key.clone(), "https://api.anthropic.com"))
    } else {
        Arc::new(OpenAiCompatibleProvider::new("ollama", "", config.llm.ollama_base_url.clone()))
    };

    let mut router = Router::new(primary);
    if let (Some(provider), Some(model)) = (&config.llm.fallback_provider, &config.llm.fallback_model) {
        let fallback: Arc<dyn LlmProvider> = if provider == "anthropic" {
            Arc::new(AnthropicProvider::new(
                config.llm.anthropic_api_key.clone().unwrap_or_default(),
                "https://api.anthropic.com",
            ))
        } else {
            Arc::new(OpenAiCompatibleProvider::new(provider.clone(), "", config.llm.ollama_base_url.clone()))
        };
        router = router.with_fallback(fallback, model.clone());
    }
    router
}

/// Waits for SIGINT or (on unix) SIGTERM and flips `shutdown_tx` so
/// `WorkerPool::run`/`Scheduler::run` can drain in-flight work and exit.
async fn watch_for_shutdown(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received, draining");
                let _ = shutdown_tx.send(true);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    info!(database_url = %config.database_url, "ingestd starting");

    let database_path = config.database_url.trim_start_matches("sqlite://").to_string();
    let store = Store::open(&database_path).context("failed to open database")?;

    let job_store = JobStore::spawn(store);
    let router = Arc::new(build_router(&config));
    let handler = Arc::new(PipelineHandler::new(database_path, router, job_store.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(watch_for_shutdown(shutdown_tx));

    match cli.command {
        Command::StartWorker { queues } => {
            let queues = if queues.is_empty() {
                vec![
                    config.queues.fetch.clone(),
                    config.queues.extraction.clone(),
                    config.queues.enrichment.clone(),
                    config.queues.default.clone(),
                ]
            } else {
                queues
            };
            let worker_config = WorkerPoolConfig {
                worker_id: recordstore::generate_id("worker"),
                queues,
                max_concurrent: 4,
                poll_interval: std::time::Duration::from_secs(2),
            };
            let pool = WorkerPool::new(worker_config, job_store, handler);
            pool.run(shutdown_rx).await;
        }
        Command::StartBeat => {
            let scheduler = Scheduler::new(job_store, 10, std::time::Duration::from_secs(60));
            scheduler.run(shutdown_rx).await;
        }
        Command::ReprocessIncidents { since } => {
            let since_ms: i64 = since.parse().context("--since must be epoch milliseconds")?;
            let store = Store::open(config.database_url.trim_start_matches("sqlite://")).context("failed to open database")?;
            let incidents: Vec<ingestcore::domain::Incident> = store.list(&[], None)?;
            let mut enqueued = 0;
            for incident in incidents.into_iter().filter(|i| i.created_at >= since_ms) {
                job_store
                    .enqueue_with_priority(
                        "extract_and_write",
                        config.queues.extraction.clone(),
                        serde_json::json!({"article_id": incident.id}),
                        3,
                        Priority::Normal,
                    )
                    .await?;
                enqueued += 1;
            }
            println!("enqueued {enqueued} reprocessing jobs");
        }
        Command::BackfillMergeInfo { apply } => {
            let store = Store::open(config.database_url.trim_start_matches("sqlite://")).context("failed to open database")?;
            let incidents: Vec<ingestcore::domain::Incident> = store.list(&[], None)?;
            let missing: Vec<_> = incidents.into_iter().filter(|i| i.merge_info.is_null()).collect();
            if apply {
                for mut incident in missing.iter().cloned() {
                    incident.merge_info = serde_json::json!({"merged": false, "cluster_entity": null, "schemas_merged": []});
                    store.update(&incident)?;
                }
                println!("backfilled merge_info on {} incidents", missing.len());
            } else {
                println!("dry run: {} incidents are missing merge_info (pass --apply to write)", missing.len());
            }
        }
    }

    Ok(())
}
