//! Wires the pipeline-stage modules into one [`JobHandler`] implementation
//! the worker pool can drive (§6.3). Each invocation opens its own
//! [`recordstore::Store`] against the configured database path and tears it
//! down at job end, per the loop-bound connection lifetime in §5.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use recordstore::{Filter, Store};

use crate::domain::{ExtractionSchema, IngestedArticle, Job};
use crate::job::{rollup, HandlerOutcome, JobHandler, JobStore};
use crate::llm::Router;
use crate::pipeline::{self, FinalDecision, Orchestrator};

pub struct PipelineHandler {
    database_path: String,
    router: Arc<Router>,
    job_store: JobStore,
}

impl PipelineHandler {
    pub fn new(database_path: impl Into<String>, router: Arc<Router>, job_store: JobStore) -> Self {
        Self {
            database_path: database_path.into(),
            router,
            job_store,
        }
    }

    fn open_store(&self) -> Result<Store, String> {
        let store = Store::open(&self.database_path).map_err(|err| err.to_string())?;
        store.ensure_table::<IngestedArticle>().map_err(|err| err.to_string())?;
        store.ensure_table::<ExtractionSchema>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::Stage1Row>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::Stage2Row>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::Incident>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::Actor>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::Event>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::IncidentActorLink>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::IncidentEventLink>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::IncidentSourceLink>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::TaskMetric>().map_err(|err| err.to_string())?;
        store.ensure_table::<crate::domain::TaskMetricAggregate>().map_err(|err| err.to_string())?;
        Ok(store)
    }

    /// Drives one article through [`pipeline::Orchestrator`] over the five
    /// `extract_and_write` stages (§4.12): `triage`, `extract`, `approval`,
    /// `dedup`, `write`. The stages communicate through a shared
    /// [`pipeline::PipelineContext`] since `Stage::run` only takes the
    /// article; each stage mutates `article.status`/`extracted_data`
    /// directly, so one `store.update` after the run persists whatever the
    /// pipeline decided.
    async fn run_extract_and_write(&self, job: &Job) -> HandlerOutcome {
        let Some(article_id) = job.params.get("article_id").and_then(serde_json::Value::as_str) else {
            return HandlerOutcome::Failed {
                error: "extract_and_write requires params.article_id".to_string(),
                category: None,
            };
        };

        let store = match self.open_store() {
            Ok(store) => store,
            Err(error) => return HandlerOutcome::Failed { error, category: None },
        };

        let mut article = match store.get::<IngestedArticle>(article_id) {
            Ok(Some(article)) => article,
            Ok(None) => {
                return HandlerOutcome::Failed {
                    error: format!("article not found: {article_id}"),
                    category: None,
                }
            }
            Err(err) => return HandlerOutcome::Failed { error: err.to_string(), category: None },
        };

        let schemas: Vec<ExtractionSchema> = match store.list(&[Filter::eq("is_active", true)], None) {
            Ok(schemas) => schemas.into_iter().filter(ExtractionSchema::is_selectable).collect(),
            Err(err) => return HandlerOutcome::Failed { error: err.to_string(), category: None },
        };

        let store = Arc::new(tokio::sync::Mutex::new(store));
        let (stages, ctx) = pipeline::extract_and_write_stages(store.clone(), self.router.clone(), schemas);
        let orchestrator = Orchestrator::new(stages, &[]);
        let result = orchestrator.execute(&mut article).await;
        drop(orchestrator);

        {
            let store = store.lock().await;
            if let Err(err) = store.update(&article) {
                return HandlerOutcome::Failed { error: err.to_string(), category: None };
            }
        }

        ctx.take_outcome().unwrap_or_else(|| match result.final_decision {
            FinalDecision::Approved => HandlerOutcome::Completed { message: None, items_processed: 1 },
            FinalDecision::Rejected | FinalDecision::Skipped => HandlerOutcome::Completed {
                message: result.stage_errors.last().cloned(),
                items_processed: 0,
            },
            FinalDecision::Pending => HandlerOutcome::Failed {
                error: "pipeline left the article in a pending state".to_string(),
                category: None,
            },
        })
    }

    async fn run_metrics_rollup(&self) -> HandlerOutcome {
        let store = match self.open_store() {
            Ok(store) => store,
            Err(error) => return HandlerOutcome::Failed { error, category: None },
        };
        let latest_period_end = store
            .list::<crate::domain::TaskMetricAggregate>(&[], None)
            .map(|rows| rows.iter().map(|row| row.period_end).max().unwrap_or(0))
            .unwrap_or(0);
        match rollup(&store, latest_period_end) {
            Ok(count) => HandlerOutcome::Completed {
                message: Some(format!("rolled up {count} buckets")),
                items_processed: count as u64,
            },
            Err(err) => HandlerOutcome::Failed {
                error: err.to_string(),
                category: None,
            },
        }
    }

    async fn run_stale_job_sweep(&self) -> HandlerOutcome {
        let now = recordstore::now_ms();
        match self.job_store.watchdog_sweep(now, 15 * 60 * 1000).await {
            Ok(report) => HandlerOutcome::Completed {
                message: Some(format!("reclaimed {} failed {}", report.reclaimed.len(), report.failed.len())),
                items_processed: (report.reclaimed.len() + report.failed.len()) as u64,
            },
            Err(err) => HandlerOutcome::Failed {
                error: err.to_string(),
                category: None,
            },
        }
    }
}

#[async_trait]
impl JobHandler for PipelineHandler {
    async fn handle(&self, job: &Job) -> HandlerOutcome {
        info!(job_id = %job.id, job_type = %job.job_type, "handling job");
        match job.job_type.as_str() {
            "extract_and_write" => self.run_extract_and_write(job).await,
            "metrics_rollup" => self.run_metrics_rollup().await,
            "stale_job_sweep" => self.run_stale_job_sweep().await,
            "fetch" | "materialized_view_refresh" => {
                warn!(job_type = %job.job_type, "delegates to an external collaborator, nothing to do in-process");
                HandlerOutcome::Completed {
                    message: Some("delegated".to_string()),
                    items_processed: 0,
                }
            }
            other => HandlerOutcome::Failed {
                error: format!("unknown job type: {other}"),
                category: None,
            },
        }
    }
}
