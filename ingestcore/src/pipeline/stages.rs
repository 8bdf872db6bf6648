//! Concrete [`Stage`] implementations that drive one article through the
//! triage -> extract -> approve -> dedup -> write sequence via
//! [`super::Orchestrator`] (§4.12).
//!
//! `Stage::run` only receives `&mut IngestedArticle`, so the richer
//! intermediate values (the Stage 1 row, candidate schemas, the merged
//! result) are threaded through a [`PipelineContext`] shared by every stage
//! in one run. Stages execute one after another inside a single
//! `Orchestrator::execute` call, so the locks never contend; they exist only
//! to satisfy the `Stage: Send + Sync` bound needed to hold stages as
//! `Arc<dyn Stage>`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recordstore::Store;

use crate::approval::{self, CategoryConfig, Decision};
use crate::dedup;
use crate::domain::{ActorType, ArticleStatus, ExtractionSchema, IngestedArticle, Stage1Row};
use crate::extraction::{self, Stage1Options};
use crate::incident_writer::{self, ActorSpec, WriteRequest};
use crate::job::HandlerOutcome;
use crate::llm::Router;
use crate::merge::{self, ExtractedResult, MergedResult};

use super::{Stage, StageOutcome};

/// Scratch state handed from one stage to the next for a single article run.
#[derive(Default)]
pub struct PipelineContext {
    stage1: Mutex<Option<Stage1Row>>,
    candidate_schemas: Mutex<Option<Vec<ExtractionSchema>>>,
    merged: Mutex<Option<MergedResult>>,
    /// Set by whichever stage reaches a terminal job outcome; read back by
    /// the caller after `Orchestrator::execute` returns. `None` means the
    /// pipeline ran every stage to `Continue` without one claiming the
    /// final word, which should not happen in practice (`WriteStage` always
    /// sets it) but is treated as a plain success if it does.
    outcome: Mutex<Option<HandlerOutcome>>,
}

impl PipelineContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_outcome(&self) -> Option<HandlerOutcome> {
        self.outcome.lock().unwrap().take()
    }

    fn set_outcome(&self, outcome: HandlerOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
    }
}

fn fail(ctx: &PipelineContext, error: impl Into<String>) -> StageOutcome {
    let error = error.into();
    ctx.set_outcome(HandlerOutcome::Failed { error: error.clone(), category: None });
    StageOutcome::Error { message: error }
}

fn skip(ctx: &PipelineContext, message: impl Into<String>) -> StageOutcome {
    let message = message.into();
    ctx.set_outcome(HandlerOutcome::Completed {
        message: Some(message.clone()),
        items_processed: 0,
    });
    StageOutcome::Skip { reason: message }
}

/// Stage 1 triage against the active general-purpose schema, followed by
/// Stage 2 candidate-schema selection (§4.6, §4.7 steps 1-4).
pub struct TriageStage {
    store: Arc<tokio::sync::Mutex<Store>>,
    router: Arc<Router>,
    schemas: Vec<ExtractionSchema>,
    ctx: Arc<PipelineContext>,
}

impl TriageStage {
    pub fn new(store: Arc<tokio::sync::Mutex<Store>>, router: Arc<Router>, schemas: Vec<ExtractionSchema>, ctx: Arc<PipelineContext>) -> Self {
        Self { store, router, schemas, ctx }
    }
}

#[async_trait(?Send)]
impl Stage for TriageStage {
    fn name(&self) -> &str {
        "triage"
    }

    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome {
        let Some(triage_schema) = self.schemas.first().cloned() else {
            return fail(&self.ctx, "no active schema configured for triage");
        };

        let store = self.store.lock().await;
        let stage1 = match extraction::run_stage1(&store, &self.router, article, &triage_schema, "", Stage1Options::default()).await {
            Ok(row) => row,
            Err(err) => return fail(&self.ctx, err.to_string()),
        };

        let candidates = extraction::select_schemas(&stage1, &self.schemas);
        *self.ctx.stage1.lock().unwrap() = Some(stage1);
        if candidates.is_empty() {
            return skip(&self.ctx, "no domain-relevant schema matched");
        }
        *self.ctx.candidate_schemas.lock().unwrap() = Some(candidates);

        StageOutcome::Continue
    }
}

/// Stage 2 structured extraction over every candidate schema, merged into
/// one result per §4.8.
pub struct ExtractStage {
    store: Arc<tokio::sync::Mutex<Store>>,
    router: Arc<Router>,
    ctx: Arc<PipelineContext>,
}

impl ExtractStage {
    pub fn new(store: Arc<tokio::sync::Mutex<Store>>, router: Arc<Router>, ctx: Arc<PipelineContext>) -> Self {
        Self { store, router, ctx }
    }
}

#[async_trait(?Send)]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        "extract"
    }

    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome {
        let Some(stage1) = self.ctx.stage1.lock().unwrap().clone() else {
            return StageOutcome::Continue;
        };
        let Some(candidate_schemas) = self.ctx.candidate_schemas.lock().unwrap().clone() else {
            return StageOutcome::Continue;
        };

        let store = self.store.lock().await;
        let stage2_rows = match extraction::run_stage2(&store, &self.router, &stage1, &article.content, candidate_schemas.clone(), 4).await {
            Ok(rows) => rows,
            Err(err) => return fail(&self.ctx, err.to_string()),
        };

        let extracted_results: Vec<ExtractedResult> = stage2_rows
            .iter()
            .filter_map(|row| {
                let schema = candidate_schemas.iter().find(|s| s.id == row.schema_id)?;
                Some(ExtractedResult {
                    extracted_data: row.extracted_data.clone(),
                    confidence: row.confidence,
                    domain_slug: schema.domain.clone(),
                    category_slug: schema.category.clone(),
                    schema_name: schema.name.clone(),
                })
            })
            .collect();

        let Some(merged) = merge::merge_results(extracted_results, &merge::default_domain_priority()) else {
            return skip(&self.ctx, "every candidate result scored below the merge floor");
        };

        *self.ctx.merged.lock().unwrap() = Some(merged);
        StageOutcome::Continue
    }
}

/// Auto-approve/auto-reject/needs-review cascade (§4.10).
pub struct ApprovalStage {
    ctx: Arc<PipelineContext>,
}

impl ApprovalStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait(?Send)]
impl Stage for ApprovalStage {
    fn name(&self) -> &str {
        "approval"
    }

    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome {
        let (Some(stage1), Some(merged)) = (self.ctx.stage1.lock().unwrap().clone(), self.ctx.merged.lock().unwrap().clone()) else {
            return StageOutcome::Continue;
        };

        let is_relevant = stage1.domain_relevance.iter().any(|r| r.is_relevant);
        let decision = approval::decide(approval::DecideInput {
            extraction: &merged.extracted_data,
            is_relevant,
            overall_confidence: merged.confidence,
            category: &CategoryConfig::default(),
            incident_type_required_fields: None,
            caller_required_fields_override: None,
        });

        match decision.decision {
            Decision::AutoReject => {
                article.status = ArticleStatus::Rejected;
                StageOutcome::Reject { reason: decision.reason }
            }
            Decision::NeedsReview => {
                article.status = ArticleStatus::Extracted;
                skip(&self.ctx, format!("needs review: {}", decision.reason))
            }
            Decision::AutoApprove => StageOutcome::Continue,
        }
    }
}

/// In-batch/cross-source duplicate check ahead of the write (§4.9).
pub struct DedupStage {
    store: Arc<tokio::sync::Mutex<Store>>,
    ctx: Arc<PipelineContext>,
}

impl DedupStage {
    pub fn new(store: Arc<tokio::sync::Mutex<Store>>, ctx: Arc<PipelineContext>) -> Self {
        Self { store, ctx }
    }
}

#[async_trait(?Send)]
impl Stage for DedupStage {
    fn name(&self) -> &str {
        "dedup"
    }

    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome {
        let Some(merged) = self.ctx.merged.lock().unwrap().clone() else {
            return StageOutcome::Continue;
        };

        let store = self.store.lock().await;
        if let Some(reason) = check_duplicates(&store, article, &merged.extracted_data) {
            article.status = ArticleStatus::Archived;
            return skip(&self.ctx, format!("skipped as duplicate: {reason}"));
        }

        StageOutcome::Continue
    }
}

/// Persists the approved, non-duplicate result as an incident (§4.11).
pub struct WriteStage {
    store: Arc<tokio::sync::Mutex<Store>>,
    schemas: Vec<ExtractionSchema>,
    ctx: Arc<PipelineContext>,
}

impl WriteStage {
    pub fn new(store: Arc<tokio::sync::Mutex<Store>>, schemas: Vec<ExtractionSchema>, ctx: Arc<PipelineContext>) -> Self {
        Self { store, schemas, ctx }
    }
}

#[async_trait(?Send)]
impl Stage for WriteStage {
    fn name(&self) -> &str {
        "write"
    }

    async fn run(&self, article: &mut IngestedArticle) -> StageOutcome {
        let Some(merged) = self.ctx.merged.lock().unwrap().clone() else {
            return StageOutcome::Continue;
        };

        let schema_required_fields: Vec<(String, Vec<String>)> = self.schemas.iter().map(|s| (s.name.clone(), s.required_fields.clone())).collect();
        let actors = build_actor_specs(&merged.extracted_data);
        let request = WriteRequest {
            extracted_data: merged.extracted_data.clone(),
            article_id: &article.id,
            domain_slug: "immigration_enforcement",
            confidence: merged.confidence,
            merge_info: Some(&merged.merge_info),
            schema_required_fields: &schema_required_fields,
            actors,
            events: Vec::new(),
        };

        let store = self.store.lock().await;
        match incident_writer::create_incident(&store, request) {
            Ok(outcome) => {
                article.status = ArticleStatus::Approved;
                article.extracted_data = Some(merged.extracted_data.clone());
                self.ctx.set_outcome(HandlerOutcome::Completed {
                    message: Some(format!("incident {} created ({} actors)", outcome.incident_id, outcome.actors_created)),
                    items_processed: 1,
                });
                StageOutcome::Continue
            }
            Err(err) => fail(&self.ctx, err.to_string()),
        }
    }
}

fn check_duplicates(store: &Store, article: &IngestedArticle, extracted: &serde_json::Value) -> Option<String> {
    let state = extracted.get("state").and_then(serde_json::Value::as_str)?;
    let date_ms = extracted.get("date_ms").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let candidates = dedup::prefilter_candidates(store, "immigration_enforcement", state, date_ms).ok()?;
    let incident_candidates: Vec<dedup::IncidentCandidate> = candidates
        .iter()
        .map(|incident| dedup::IncidentCandidate {
            incident_id: incident.id.clone(),
            source_url: None,
            description: incident.summary.clone(),
            state: incident.location.clone(),
            occurred_at: incident.occurred_at,
            offender_name: extracted.get("offender_name").and_then(serde_json::Value::as_str).map(str::to_string),
            victim_name: extracted.get("victim_name").and_then(serde_json::Value::as_str).map(str::to_string),
        })
        .collect();

    dedup::find_duplicate(
        &incident_candidates,
        &article.source_url,
        extracted.get("summary").and_then(serde_json::Value::as_str).unwrap_or(""),
        extracted.get("offender_name").and_then(serde_json::Value::as_str),
        extracted.get("victim_name").and_then(serde_json::Value::as_str),
    )
    .map(|m| format!("{:?} ({:.2})", m.strategy, m.confidence))
}

fn build_actor_specs(extracted: &serde_json::Value) -> Vec<ActorSpec> {
    let mut specs = Vec::new();
    if let Some(name) = extracted.get("offender_name").and_then(serde_json::Value::as_str) {
        specs.push(ActorSpec {
            name: name.to_string(),
            actor_type: ActorType::Person,
            role: Some("offender".to_string()),
        });
    }
    if let Some(name) = extracted.get("victim_name").and_then(serde_json::Value::as_str) {
        specs.push(ActorSpec {
            name: name.to_string(),
            actor_type: ActorType::Person,
            role: Some("victim".to_string()),
        });
    }
    specs
}

/// Builds the five extract-and-write stages in their execution order, backed
/// by one shared `Store` (loop-bound connection lifetime, §5) and one
/// `PipelineContext` for the run.
pub fn extract_and_write_stages(
    store: Arc<tokio::sync::Mutex<Store>>,
    router: Arc<Router>,
    schemas: Vec<ExtractionSchema>,
) -> (Vec<Arc<dyn Stage>>, Arc<PipelineContext>) {
    let ctx = PipelineContext::new();
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(TriageStage::new(store.clone(), router.clone(), schemas.clone(), ctx.clone())),
        Arc::new(ExtractStage::new(store.clone(), router, ctx.clone())),
        Arc::new(ApprovalStage::new(ctx.clone())),
        Arc::new(DedupStage::new(store.clone(), ctx.clone())),
        Arc::new(WriteStage::new(store, schemas, ctx.clone())),
    ];
    (stages, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtractionStatus, SchemaType};
    use crate::llm::mock::MockProvider;
    use crate::llm::LlmError;
    use crate::pipeline::{FinalDecision, Orchestrator};

    fn schema() -> ExtractionSchema {
        ExtractionSchema::new(
            "triage",
            SchemaType::Stage1,
            "general",
            serde_json::json!({}),
            "You triage articles.",
            "Criteria: {domain_relevance_criteria}\n\nArticle: {article_text}",
            "claude-sonnet-4-20250514",
        )
    }

    fn article() -> IngestedArticle {
        IngestedArticle::new("src1", "https://example.com/a", "Title", "Juan Perez was arrested.")
    }

    #[tokio::test]
    async fn triage_stage_skips_when_no_schema_is_selectable() {
        let store = Arc::new(tokio::sync::Mutex::new(Store::open_in_memory().unwrap()));
        let router = Arc::new(Router::new(Arc::new(MockProvider::new(
            "anthropic",
            vec![Err(LlmError::permanent("anthropic", "x", "should not be called", None))],
        ))));
        let (stages, ctx) = extract_and_write_stages(store, router, Vec::new());
        let orchestrator = Orchestrator::new(stages, &[]);
        let mut a = article();
        let result = orchestrator.execute(&mut a).await;
        assert_eq!(result.final_decision, FinalDecision::Rejected);
        match ctx.take_outcome() {
            Some(HandlerOutcome::Failed { error, .. }) => assert!(error.contains("no active schema")),
            other => panic!("expected a Failed outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_pipeline_writes_an_incident_on_auto_approve() {
        let store_inner = Store::open_in_memory().unwrap();
        store_inner.ensure_table::<IngestedArticle>().unwrap();
        store_inner.ensure_table::<Stage1Row>().unwrap();
        store_inner.ensure_table::<crate::domain::Stage2Row>().unwrap();
        store_inner.ensure_table::<crate::domain::Incident>().unwrap();
        store_inner.ensure_table::<crate::domain::Actor>().unwrap();
        store_inner.ensure_table::<crate::domain::IncidentActorLink>().unwrap();
        store_inner.ensure_table::<crate::domain::IncidentSourceLink>().unwrap();

        let a = article();
        store_inner.insert(&a).unwrap();

        let stage1_body = serde_json::json!({
            "entities": [{"name": "Juan Perez"}],
            "events": [],
            "overall_confidence": 0.9,
            "classification_hints": [{"domain_slug": "immigration", "confidence": 0.9}],
            "domain_relevance": [{"domain_slug": "immigration", "is_relevant": true, "confidence": 0.9}],
        })
        .to_string();
        let stage2_body = serde_json::json!({
            "offender_name": "Juan Perez",
            "state": "TX",
            "summary": "ICE detained Juan Perez.",
            "confidence": 0.95,
        })
        .to_string();

        let responses = vec![
            Ok(mock_response(&stage1_body)),
            Ok(mock_response(&stage2_body)),
        ];
        let router = Arc::new(Router::new(Arc::new(MockProvider::new("anthropic", responses))));

        let mut schema2 = schema();
        schema2.schema_type = SchemaType::Stage2;
        schema2.name = "detention".to_string();
        schema2.domain = "immigration".to_string();
        schema2.is_production = true;

        let mut triage_schema = schema();
        triage_schema.is_production = true;

        let store = Arc::new(tokio::sync::Mutex::new(store_inner));
        let (stages, ctx) = extract_and_write_stages(store, router, vec![triage_schema, schema2]);
        let orchestrator = Orchestrator::new(stages, &[]);
        let mut a = article();
        let result = orchestrator.execute(&mut a).await;
        assert_eq!(result.final_decision, FinalDecision::Approved);
        match ctx.take_outcome() {
            Some(HandlerOutcome::Completed { items_processed, .. }) => assert_eq!(items_processed, 1),
            other => panic!("expected a Completed outcome, got {other:?}"),
        }
        assert_eq!(a.status, ArticleStatus::Approved);
    }

    fn mock_response(text: &str) -> crate::llm::CompletionResponse {
        crate::llm::CompletionResponse {
            text: text.to_string(),
            stop_reason: crate::llm::StopReason::EndTurn,
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            usage: crate::llm::TokenUsage { input_tokens: 10, output_tokens: 20 },
            latency: std::time::Duration::from_millis(5),
        }
    }
}
