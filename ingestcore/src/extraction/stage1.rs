//! Stage 1 Extractor (§4.6): one broad pass over an article producing
//! entities, events, and domain-relevance hints that Stage 2 schemas key off.

use md5::{Digest, Md5};
use recordstore::{Filter, Store};
use serde_json::Value;
use tracing::warn;

use crate::domain::{ClassificationHint, DomainRelevance, ExtractionSchema, ExtractionStatus, IngestedArticle, Stage1Row};
use crate::llm::{CompletionRequest, Router};

use super::error::{ExtractionError, ExtractionResult};
use super::repair::repair_truncated_json;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const MAX_TOKENS_CAP: u32 = 16384;

pub struct Stage1Options {
    pub force: bool,
    pub provider_override: Option<String>,
    pub model_override: Option<String>,
}

impl Default for Stage1Options {
    fn default() -> Self {
        Self {
            force: false,
            provider_override: None,
            model_override: None,
        }
    }
}

/// `run_stage1(article_id, force, provider_override?, model_override?) -> Stage1Row`.
///
/// Idempotent: a completed row for `article.id` is returned unchanged unless
/// `force` is set. `domain_relevance_criteria` is substituted into the
/// schema's prompt template before `article_text`, in that order, so the
/// untrusted article body cannot inject a replacement for the first
/// placeholder.
pub async fn run_stage1(
    store: &Store,
    router: &Router,
    article: &IngestedArticle,
    schema: &ExtractionSchema,
    domain_relevance_criteria: &str,
    opts: Stage1Options,
) -> ExtractionResult<Stage1Row> {
    if !opts.force {
        if let Some(existing) = store.find_one::<Stage1Row>(&[
            Filter::eq("article_id", article.id.as_str()),
            Filter::eq("status", ExtractionStatus::Completed.to_string()),
        ])? {
            return Ok(existing);
        }
    }

    let user_prompt = schema
        .user_prompt_template
        .replacen("{domain_relevance_criteria}", domain_relevance_criteria, 1)
        .replacen("{article_text}", &article.content, 1);
    let prompt_hash = hash_prompt(&schema.system_prompt, &schema.user_prompt_template);

    let mut row = Stage1Row::new_pending(&article.id, schema.version, &prompt_hash);
    store.insert(&row)?;

    let model = opts.model_override.clone().unwrap_or_else(|| schema.model_name.clone());
    let request = CompletionRequest::new(schema.system_prompt.clone(), user_prompt, model, DEFAULT_MAX_TOKENS);

    let response = match router.call(request.clone()).await {
        Ok(response) => response,
        Err(err) => {
            row.status = ExtractionStatus::Failed;
            row.error = Some(err.to_string());
            store.update(&row)?;
            return Err(err.into());
        }
    };

    let (parsed, notes) = parse_with_truncation_policy(router, &request, &response).await?;

    row.extraction_data = parsed.get("extraction_data").cloned().unwrap_or(parsed.clone());
    row.entity_count = count_array(&parsed, "entities");
    row.event_count = count_array(&parsed, "events");
    row.overall_confidence = parsed.get("overall_confidence").and_then(Value::as_f64).unwrap_or(0.0);
    row.classification_hints = parse_classification_hints(&parsed);
    row.domain_relevance = parse_domain_relevance(&parsed);
    row.provider = Some(response.provider.clone());
    row.model = Some(response.model.clone());
    row.input_tokens = Some(response.usage.input_tokens as u32);
    row.output_tokens = Some(response.usage.output_tokens as u32);
    row.latency_ms = Some(response.latency.as_millis() as u64);
    row.status = ExtractionStatus::Completed;
    row.extraction_notes = notes;
    store.update(&row)?;

    let mut article = article.clone();
    article.latest_extraction_id = Some(row.id.clone());
    article.extraction_pipeline = Some(crate::domain::ExtractionPipeline::TwoStage);
    store.update(&article)?;

    Ok(row)
}

/// Parse the provider's raw text as JSON, applying §4.6's truncation policy
/// when the provider reports it ran out of tokens.
async fn parse_with_truncation_policy(
    router: &Router,
    request: &CompletionRequest,
    response: &crate::llm::CompletionResponse,
) -> ExtractionResult<(Value, Option<String>)> {
    if let Ok(value) = serde_json::from_str::<Value>(&response.text) {
        return Ok((value, None));
    }

    if !response.stop_reason.is_truncated() {
        return Err(ExtractionError::UnparseableJson(response.text.clone()));
    }

    let repaired = repair_truncated_json(&response.text);

    let mut retry_request = request.clone();
    retry_request.max_tokens = (retry_request.max_tokens * 2).min(MAX_TOKENS_CAP);
    retry_request.user_message.push_str("\n\nExtract only the top 10 most significant incidents.");

    let retried = router.call(retry_request).await.ok();
    let retried_parsed = retried.and_then(|r| serde_json::from_str::<Value>(&r.text).ok().or_else(|| repair_truncated_json(&r.text)));

    match (repaired, retried_parsed) {
        (Some(a), Some(b)) => {
            if richer(&b, &a) {
                Ok((b, Some(format!("[TRUNCATED] kept adaptive retry over repaired partial"))))
            } else {
                Ok((a, Some(format!("[TRUNCATED] kept repaired partial over adaptive retry"))))
            }
        }
        (Some(a), None) => Ok((a, Some("[TRUNCATED] kept repaired partial".to_string()))),
        (None, Some(b)) => Ok((b, Some("[TRUNCATED] kept adaptive retry".to_string()))),
        (None, None) => {
            warn!("stage1: truncated response could not be repaired or retried");
            Err(ExtractionError::UnparseableJson(response.text.clone()))
        }
    }
}

fn richer(a: &Value, b: &Value) -> bool {
    (count_array(a, "entities") + count_array(a, "events")) > (count_array(b, "entities") + count_array(b, "events"))
}

fn count_array(value: &Value, field: &str) -> u32 {
    value.get(field).and_then(Value::as_array).map(|a| a.len() as u32).unwrap_or(0)
}

fn parse_classification_hints(value: &Value) -> Vec<ClassificationHint> {
    value
        .get("classification_hints")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|h| {
                    Some(ClassificationHint {
                        domain_slug: h.get("domain_slug")?.as_str()?.to_string(),
                        category_slug: h.get("category_slug").and_then(Value::as_str).map(str::to_string),
                        confidence: h.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_domain_relevance(value: &Value) -> Vec<DomainRelevance> {
    value
        .get("domain_relevance")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|d| {
                    Some(DomainRelevance {
                        domain_slug: d.get("domain_slug")?.as_str()?.to_string(),
                        is_relevant: d.get("is_relevant").and_then(Value::as_bool).unwrap_or(false),
                        confidence: d.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn hash_prompt(system_prompt: &str, user_prompt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(system_prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(user_prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}
