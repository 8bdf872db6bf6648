//! Stage 2 Router (§4.7): per-schema structured extraction against a
//! completed Stage 1 row, run in parallel under a provider concurrency cap.

use futures::stream::{self, StreamExt};
use recordstore::Store;
use serde_json::Value;

use crate::domain::{
    ClassificationHint, DomainRelevance, ExtractionSchema, ExtractionStatus, FieldDefinition, FieldType, SourceSpan, Stage1Row, Stage2Row,
    validate_spans,
};
use crate::llm::{CompletionRequest, Router};

use super::error::ExtractionResult;
use super::repair::repair_truncated_json;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Select which active Stage 2 schemas apply to a Stage 1 row (§4.7 steps 1-4).
pub fn select_schemas(stage1: &Stage1Row, active_schemas: &[ExtractionSchema]) -> Vec<ExtractionSchema> {
    let relevant_hints: Vec<&ClassificationHint> = stage1.classification_hints.iter().filter(|h| h.confidence >= 0.3).collect();

    let relevant_hints: Vec<&ClassificationHint> = if stage1.domain_relevance.is_empty() {
        relevant_hints
    } else {
        let relevant_domains: Vec<&DomainRelevance> = stage1
            .domain_relevance
            .iter()
            .filter(|d| d.is_relevant && d.confidence >= 0.5)
            .collect();
        if relevant_domains.is_empty() {
            return Vec::new();
        }
        relevant_hints
            .into_iter()
            .filter(|hint| relevant_domains.iter().any(|d| normalize_slug(&d.domain_slug) == normalize_slug(&hint.domain_slug)))
            .collect()
    };

    let mut selected: Vec<ExtractionSchema> = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    for schema in active_schemas.iter().filter(|s| s.is_selectable()) {
        for hint in &relevant_hints {
            if schema_matches_hint(schema, hint) {
                if seen_ids.insert(schema.id.clone()) {
                    selected.push(schema.clone());
                }
                break;
            }
        }
    }

    selected
}

fn schema_matches_hint(schema: &ExtractionSchema, hint: &ClassificationHint) -> bool {
    let schema_domain = normalize_slug(&schema.domain);
    let hint_domain = normalize_slug(&hint.domain_slug);

    // (a) exact domain+category
    if let (Some(category), Some(hint_category)) = (&schema.category, &hint.category_slug) {
        if schema_domain == hint_domain && normalize_slug(category) == normalize_slug(hint_category) {
            return true;
        }
    }

    // (b) combined domain_category equals hint domain slug
    if let Some(category) = &schema.category {
        let combined = format!("{schema_domain}_{}", normalize_slug(category));
        if combined == hint_domain {
            return true;
        }
    }

    // (c) schema domain equals hint domain, category invented by the hint
    if schema_domain == hint_domain {
        return true;
    }

    // (d) hint domain starts with schema_domain_
    if hint_domain.starts_with(&format!("{schema_domain}_")) {
        return true;
    }

    false
}

fn normalize_slug(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `run_stage2(stage1_row_id, schema_ids?) -> Vec<Stage2Row>`. When
/// `schema_ids` is omitted, schemas are auto-selected per [`select_schemas`].
pub async fn run_stage2(
    store: &Store,
    router: &Router,
    stage1: &Stage1Row,
    article_text: &str,
    schemas: Vec<ExtractionSchema>,
    concurrency: usize,
) -> ExtractionResult<Vec<Stage2Row>> {
    let results: Vec<ExtractionResult<Stage2Row>> = stream::iter(schemas.iter())
        .map(|schema| run_one_schema(store, router, stage1, article_text, schema))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

async fn run_one_schema(
    store: &Store,
    router: &Router,
    stage1: &Stage1Row,
    article_text: &str,
    schema: &ExtractionSchema,
) -> ExtractionResult<Stage2Row> {
    // Supersede any prior row for this (stage1_row_id, schema_id) pair before
    // inserting the new one (§5: "re-extraction supersedes the prior row").
    let composite_id = Stage2Row::composite_id(&stage1.id, &schema.id);
    if let Some(mut prior) = store.get::<Stage2Row>(&composite_id)? {
        if prior.status != ExtractionStatus::Superseded {
            prior.status = ExtractionStatus::Superseded;
            store.update(&prior)?;
        }
    }

    let stage1_output = serde_json::to_string_pretty(&stage1.extraction_data).unwrap_or_default();
    let user_prompt = schema
        .user_prompt_template
        .replacen("{stage1_output}", &stage1_output, 1)
        .replacen("{article_text}", article_text, 1);

    let request = CompletionRequest::new(schema.system_prompt.clone(), user_prompt, schema.model_name.clone(), DEFAULT_MAX_TOKENS);

    let mut row = Stage2Row::new(&stage1.id, &schema.id, stage1.stage1_schema_version);

    let response = router.call(request).await?;

    let parsed = serde_json::from_str::<Value>(&response.text).ok().or_else(|| repair_truncated_json(&response.text));

    let Some(mut parsed) = parsed else {
        row.status = ExtractionStatus::Failed;
        store.update(&row)?;
        return Ok(row);
    };

    let raw_spans = extract_source_spans(&mut parsed);
    let valid_spans = validate_spans(article_text, raw_spans);

    let mut type_errors = coerce_field_definitions(&mut parsed, &schema.field_definitions);
    let llm_confidence = parsed.get("confidence").and_then(Value::as_f64);
    let (confidence, mut validation_errors) = score_extraction(&parsed, schema, llm_confidence);
    validation_errors.append(&mut type_errors);

    row.extracted_data = parsed;
    row.source_spans = valid_spans;
    row.confidence = confidence;
    row.validation_errors = validation_errors;
    row.status = ExtractionStatus::Completed;
    row.used_original_text = true;
    row.provider = Some(response.provider);
    row.model = Some(response.model);
    row.input_tokens = Some(response.usage.input_tokens as u32);
    row.output_tokens = Some(response.usage.output_tokens as u32);
    row.latency_ms = Some(response.latency.as_millis() as u64);

    store.update(&row)?;
    Ok(row)
}

/// Pull `source_spans` out of the extracted payload so it isn't treated as a
/// regular field, then re-attach only the spans that validate (§4.7.1).
fn extract_source_spans(parsed: &mut Value) -> Vec<SourceSpan> {
    let Some(obj) = parsed.as_object_mut() else {
        return Vec::new();
    };
    let Some(raw) = obj.remove("source_spans") else {
        return Vec::new();
    };
    serde_json::from_value(raw).unwrap_or_default()
}

/// Weighted confidence: required-field presence (critical fields
/// double-weighted), optional bonus up to +0.15, blended with an
/// LLM-reported score, then cross-field penalties capped at 0.3 (§4.7).
fn score_extraction(data: &Value, schema: &ExtractionSchema, llm_confidence: Option<f64>) -> (f64, Vec<String>) {
    let mut validation_errors = Vec::new();
    let critical_fields = ["victim_name", "offender_name", "incident_type", "date", "state"];

    let mut weight_total = 0.0;
    let mut weight_present = 0.0;
    for field in &schema.required_fields {
        let weight = if critical_fields.contains(&field.as_str()) { 2.0 } else { 1.0 };
        weight_total += weight;
        if field_is_present(data, field) {
            weight_present += weight;
        } else {
            validation_errors.push(format!("missing required field: {field}"));
        }
    }
    let field_score = if weight_total > 0.0 { weight_present / weight_total } else { 1.0 };

    let optional_bonus = if validation_errors.is_empty() && !schema.required_fields.is_empty() {
        0.15
    } else {
        0.0
    };

    let blended = match llm_confidence {
        Some(llm) => 0.6 * field_score + 0.4 * normalize_confidence(llm),
        None => field_score,
    };

    let mut confidence = (blended + optional_bonus).min(1.0);

    let mut penalty: f64 = 0.0;
    if !dates_are_chronological(data) {
        penalty += 0.15;
        validation_errors.push("dates are not chronologically consistent".to_string());
    }
    if disposition_is_convicted_without_charges(data) {
        penalty += 0.15;
        validation_errors.push("disposition is 'convicted' with no charges".to_string());
    }
    confidence -= penalty.min(0.3);

    (confidence.clamp(0.0, 1.0), validation_errors)
}

/// Validate and coerce extracted fields against the schema's typed
/// `field_definitions` (§4.7): a string holding a number is coerced in
/// place, a value that cannot be coerced to its declared type is left
/// untouched and reported.
fn coerce_field_definitions(data: &mut Value, field_definitions: &[FieldDefinition]) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = data.as_object_mut() else {
        return errors;
    };

    for def in field_definitions {
        let Some(value) = obj.get(&def.name) else { continue };
        if value.is_null() {
            continue;
        }
        match coerce_value(value, def.field_type) {
            Some(coerced) => {
                obj.insert(def.name.clone(), coerced);
            }
            None => errors.push(format!("field '{}' does not match declared type {:?}", def.name, def.field_type)),
        }
    }

    errors
}

/// Returns `Some` with the (possibly unchanged) value when it already
/// matches or can be losslessly coerced to `field_type`, `None` otherwise.
fn coerce_value(value: &Value, field_type: FieldType) -> Option<Value> {
    match (field_type, value) {
        (FieldType::Text, Value::String(_)) => Some(value.clone()),
        (FieldType::Text, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldType::Text, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(s)) => s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number),
        (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldType::Array, Value::Array(_)) => Some(value.clone()),
        _ => None,
    }
}

fn field_is_present(data: &Value, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        _ => true,
    }
}

fn normalize_confidence(raw: f64) -> f64 {
    if raw > 1.0 { (raw / 100.0).min(1.0) } else { raw }
}

fn dates_are_chronological(data: &Value) -> bool {
    let (Some(start), Some(end)) = (
        data.get("occurred_at").and_then(Value::as_str),
        data.get("resolved_at").and_then(Value::as_str),
    ) else {
        return true;
    };
    start <= end
}

fn disposition_is_convicted_without_charges(data: &Value) -> bool {
    let disposition = data.get("disposition").and_then(Value::as_str).unwrap_or_default();
    if !disposition.eq_ignore_ascii_case("convicted") {
        return false;
    }
    match data.get("charges") {
        Some(Value::Array(a)) => a.is_empty(),
        None | Some(Value::Null) => true,
        _ => false,
    }
}
