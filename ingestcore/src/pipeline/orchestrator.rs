//! Pipeline Orchestrator (§4.12): drives a configurable, ordered sequence
//! of stages over one article, then the same sequence over a batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::domain::IngestedArticle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    /// Breaks early without rejecting, e.g. a duplicate found.
    Skip { reason: String },
    /// Breaks and marks the article rejected.
    Reject { reason: String },
    /// Logged; the pipeline continues to the next stage.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalDecision {
    Approved,
    Rejected,
    Skipped,
    Pending,
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub name: String,
    pub is_active: bool,
    pub execution_order: Option<i64>,
}

#[async_trait(?Send)]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome;
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub article_id: String,
    pub final_decision: FinalDecision,
    pub stage_errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Orchestrator {
    stages: Vec<Arc<dyn Stage>>,
}

impl Orchestrator {
    /// Order stages by `(execution_order ?? default index)`, dropping any
    /// not marked active (§4.12).
    pub fn new(stages: Vec<Arc<dyn Stage>>, configs: &[StageConfig]) -> Self {
        let mut ordered: Vec<(i64, Arc<dyn Stage>)> = stages
            .into_iter()
            .enumerate()
            .filter_map(|(default_order, stage)| {
                let config = configs.iter().find(|c| c.name == stage.name());
                let is_active = config.map(|c| c.is_active).unwrap_or(true);
                if !is_active {
                    return None;
                }
                let order = config.and_then(|c| c.execution_order).unwrap_or(default_order as i64);
                Some((order, stage))
            })
            .collect();
        ordered.sort_by_key(|(order, _)| *order);

        Self {
            stages: ordered.into_iter().map(|(_, stage)| stage).collect(),
        }
    }

    /// `execute(article) -> PipelineResult` (§4.12).
    pub async fn execute(&self, article: &mut IngestedArticle) -> PipelineResult {
        let mut stage_errors = Vec::new();
        let mut final_decision = FinalDecision::Pending;

        for stage in &self.stages {
            match stage.run(article).await {
                StageOutcome::Continue => continue,
                StageOutcome::Skip { reason } => {
                    final_decision = FinalDecision::Skipped;
                    stage_errors.push(format!("{}: skipped ({reason})", stage.name()));
                    break;
                }
                StageOutcome::Reject { reason } => {
                    final_decision = FinalDecision::Rejected;
                    stage_errors.push(format!("{}: rejected ({reason})", stage.name()));
                    break;
                }
                StageOutcome::Error { message } => {
                    error!(stage = stage.name(), %message, "pipeline stage error, continuing");
                    stage_errors.push(format!("{}: error ({message})", stage.name()));
                }
            }
        }

        if final_decision == FinalDecision::Pending {
            final_decision = FinalDecision::Approved;
        }

        PipelineResult {
            article_id: article.id.clone(),
            final_decision,
            stage_errors,
        }
    }

    /// Batch mode: sequential with a configurable delay, or bounded
    /// concurrency under a semaphore, accumulating per-outcome counts.
    pub async fn execute_batch(&self, articles: &mut [IngestedArticle], concurrency: usize, sequential_delay: Option<Duration>) -> BatchSummary {
        if concurrency <= 1 {
            let mut summary = BatchSummary::default();
            for article in articles.iter_mut() {
                let result = self.execute(article).await;
                record_outcome(&mut summary, result.final_decision);
                if let Some(delay) = sequential_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            return summary;
        }

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let decisions: Vec<FinalDecision> = stream::iter(articles.iter_mut())
            .map(|article| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    self.execute(article).await.final_decision
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for decision in decisions {
            record_outcome(&mut summary, decision);
        }
        summary
    }
}

fn record_outcome(summary: &mut BatchSummary, decision: FinalDecision) {
    match decision {
        FinalDecision::Approved => summary.approved += 1,
        FinalDecision::Rejected => summary.rejected += 1,
        FinalDecision::Skipped => summary.skipped += 1,
        FinalDecision::Pending => warn!("batch outcome left pending, counting as error"),
    }
    if decision == FinalDecision::Pending {
        summary.errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysContinue;
    #[async_trait(?Send)]
    impl Stage for AlwaysContinue {
        fn name(&self) -> &str {
            "always_continue"
        }
        async fn run(&self, _article: &mut IngestedArticle) -> StageOutcome {
            StageOutcome::Continue
        }
    }

    struct AlwaysReject;
    #[async_trait(?Send)]
    impl Stage for AlwaysReject {
        fn name(&self) -> &str {
            "always_reject"
        }
        async fn run(&self, _article: &mut IngestedArticle) -> StageOutcome {
            StageOutcome::Reject { reason: "policy".to_string() }
        }
    }

    struct AlwaysError;
    #[async_trait(?Send)]
    impl Stage for AlwaysError {
        fn name(&self) -> &str {
            "always_error"
        }
        async fn run(&self, _article: &mut IngestedArticle) -> StageOutcome {
            StageOutcome::Error { message: "transient blip".to_string() }
        }
    }

    fn article() -> IngestedArticle {
        IngestedArticle::new("source_1", "https://x.com/1", "title", "content")
    }

    #[tokio::test]
    async fn all_continue_stages_approve() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AlwaysContinue), Arc::new(AlwaysContinue)];
        let configs = vec![
            StageConfig { name: "always_continue".to_string(), is_active: true, execution_order: None },
        ];
        let orchestrator = Orchestrator::new(stages, &configs);
        let result = orchestrator.execute(&mut article()).await;
        assert_eq!(result.final_decision, FinalDecision::Approved);
    }

    #[tokio::test]
    async fn reject_stage_breaks_the_pipeline() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AlwaysContinue), Arc::new(AlwaysReject), Arc::new(AlwaysContinue)];
        let orchestrator = Orchestrator::new(stages, &[]);
        let result = orchestrator.execute(&mut article()).await;
        assert_eq!(result.final_decision, FinalDecision::Rejected);
        assert_eq!(result.stage_errors.len(), 1);
    }

    #[tokio::test]
    async fn error_stage_logs_and_continues() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AlwaysError), Arc::new(AlwaysContinue)];
        let orchestrator = Orchestrator::new(stages, &[]);
        let result = orchestrator.execute(&mut article()).await;
        assert_eq!(result.final_decision, FinalDecision::Approved);
        assert_eq!(result.stage_errors.len(), 1);
    }

    #[tokio::test]
    async fn inactive_stage_is_skipped_from_the_sequence() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AlwaysReject)];
        let configs = vec![StageConfig {
            name: "always_reject".to_string(),
            is_active: false,
            execution_order: None,
        }];
        let orchestrator = Orchestrator::new(stages, &configs);
        let result = orchestrator.execute(&mut article()).await;
        assert_eq!(result.final_decision, FinalDecision::Approved);
    }

    #[tokio::test]
    async fn batch_mode_accumulates_counts() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(AlwaysContinue)];
        let orchestrator = Orchestrator::new(stages, &[]);
        let mut articles = vec![article(), article(), article()];
        let summary = orchestrator.execute_batch(&mut articles, 2, None).await;
        assert_eq!(summary.approved, 3);
    }
}
