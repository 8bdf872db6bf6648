//! Approval Decider (§4.10): the seven-step, first-applicable-wins cascade
//! that turns one extraction into auto_approve / auto_reject / needs_review.

use serde_json::Value;

const UNIVERSAL_MINIMUM_FIELDS: &[&str] = &["date", "state"];
const DEFAULT_FIELD_CONFIDENCE_THRESHOLD: f64 = 0.70;
const DEFAULT_AUTO_REJECT_BELOW: f64 = 0.30;
const DEFAULT_MIN_CONFIDENCE_REVIEW: f64 = 0.50;

/// Crime-severity table: substring-matched against `incident_type`.
const SEVERITY_TABLE: &[(&str, u8)] = &[
    ("homicide", 10),
    ("murder", 10),
    ("sexual assault", 9),
    ("kidnapping", 8),
    ("assault", 6),
    ("robbery", 6),
    ("theft", 4),
    ("detention", 4),
    ("deportation", 4),
];
const DEFAULT_SEVERITY: u8 = 3;

#[derive(Debug, Clone)]
pub enum Decision {
    AutoApprove,
    AutoReject,
    NeedsReview,
}

#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub decision: Decision,
    pub confidence: f64,
    pub reason: String,
    pub missing_fields: Vec<String>,
    pub low_confidence_fields: Vec<String>,
}

/// Category-level policy (overridable at runtime, §4.10 last paragraph).
#[derive(Debug, Clone)]
pub struct CategoryConfig {
    pub auto_reject_enabled: bool,
    pub auto_approve_enabled: bool,
    pub required_fields: Vec<String>,
    pub field_confidence_threshold: f64,
    pub auto_reject_below: f64,
    pub min_confidence_review: f64,
    pub approve_confidence_threshold: f64,
    pub max_severity_auto_reject: u8,
    pub min_severity_auto_approve: u8,
    pub severity_gate_enabled: bool,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            auto_reject_enabled: true,
            auto_approve_enabled: true,
            required_fields: Vec::new(),
            field_confidence_threshold: DEFAULT_FIELD_CONFIDENCE_THRESHOLD,
            auto_reject_below: DEFAULT_AUTO_REJECT_BELOW,
            min_confidence_review: DEFAULT_MIN_CONFIDENCE_REVIEW,
            approve_confidence_threshold: 0.85,
            max_severity_auto_reject: 2,
            min_severity_auto_approve: 0,
            severity_gate_enabled: true,
        }
    }
}

pub struct DecideInput<'a> {
    pub extraction: &'a Value,
    pub is_relevant: bool,
    pub overall_confidence: f64,
    pub category: &'a CategoryConfig,
    /// database-backed required-fields override for this incident_type_id, if any
    pub incident_type_required_fields: Option<Vec<String>>,
    pub caller_required_fields_override: Option<Vec<String>>,
}

/// `decide(article, extraction, category, incident_type_id?) -> DecisionResult` (§4.10).
pub fn decide(input: DecideInput) -> DecisionResult {
    // Step 1: relevance gate.
    if !input.is_relevant && input.category.auto_reject_enabled {
        return reject(input.overall_confidence, "extraction marked not relevant");
    }

    // Step 2: confidence floor.
    if input.overall_confidence < input.category.auto_reject_below && input.category.auto_reject_enabled {
        return reject(input.overall_confidence, "overall confidence below auto-reject threshold");
    }

    // Step 3: normalize extracted data.
    let normalized = normalize_extraction(input.extraction, input.overall_confidence);

    // Step 4: required fields, override precedence.
    let required_fields = resolve_required_fields(&input);
    let missing_fields: Vec<String> = required_fields.iter().filter(|f| !field_is_present(&normalized, f)).cloned().collect();
    if !missing_fields.is_empty() {
        return DecisionResult {
            decision: Decision::NeedsReview,
            confidence: input.overall_confidence,
            reason: "missing required fields".to_string(),
            missing_fields,
            low_confidence_fields: Vec::new(),
        };
    }

    // Step 5: per-field confidence gate.
    let low_confidence_fields: Vec<String> = required_fields
        .iter()
        .filter(|field| field_confidence(&normalized, field) < input.category.field_confidence_threshold)
        .cloned()
        .collect();
    if !low_confidence_fields.is_empty() {
        return DecisionResult {
            decision: Decision::NeedsReview,
            confidence: input.overall_confidence,
            reason: "low confidence on required fields".to_string(),
            missing_fields: Vec::new(),
            low_confidence_fields,
        };
    }

    // Step 6: severity gate.
    let severity = normalized
        .get("incident_type")
        .and_then(Value::as_str)
        .map(severity_for)
        .unwrap_or(DEFAULT_SEVERITY);

    if input.category.severity_gate_enabled && severity < input.category.max_severity_auto_reject && input.category.auto_reject_enabled {
        return reject(input.overall_confidence, "severity below auto-reject floor");
    }

    let severity_satisfied = !input.category.severity_gate_enabled || severity >= input.category.min_severity_auto_approve;

    // Step 7: confidence bands.
    if input.overall_confidence >= input.category.approve_confidence_threshold && severity_satisfied && input.category.auto_approve_enabled {
        return DecisionResult {
            decision: Decision::AutoApprove,
            confidence: input.overall_confidence,
            reason: "confidence and severity bands satisfied".to_string(),
            missing_fields: Vec::new(),
            low_confidence_fields: Vec::new(),
        };
    }

    if input.overall_confidence >= input.category.min_confidence_review {
        return DecisionResult {
            decision: Decision::NeedsReview,
            confidence: input.overall_confidence,
            reason: "confidence in review band".to_string(),
            missing_fields: Vec::new(),
            low_confidence_fields: Vec::new(),
        };
    }

    DecisionResult {
        decision: Decision::NeedsReview,
        confidence: input.overall_confidence,
        reason: "evaluation complete".to_string(),
        missing_fields: Vec::new(),
        low_confidence_fields: Vec::new(),
    }
}

fn reject(confidence: f64, reason: &str) -> DecisionResult {
    DecisionResult {
        decision: Decision::AutoReject,
        confidence,
        reason: reason.to_string(),
        missing_fields: Vec::new(),
        low_confidence_fields: Vec::new(),
    }
}

/// Flatten `location.{state,city}`, infer `incident_type` from
/// `charges[0] | violation_type | case_type | event_type`, map
/// `immigration_status -> offender_immigration_status`, coalesce
/// `confidence -> overall_confidence`.
fn normalize_extraction(extraction: &Value, overall_confidence: f64) -> Value {
    let mut normalized = extraction.clone();
    let Some(obj) = normalized.as_object_mut() else {
        return normalized;
    };

    if let Some(location) = obj.get("location").cloned() {
        if let Some(state) = location.get("state") {
            obj.entry("state").or_insert_with(|| state.clone());
        }
        if let Some(city) = location.get("city") {
            obj.entry("city").or_insert_with(|| city.clone());
        }
    }

    if !obj.contains_key("incident_type") {
        let inferred = obj
            .get("charges")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .map(coerce_to_text)
            .or_else(|| obj.get("violation_type").map(coerce_to_text))
            .or_else(|| obj.get("case_type").map(coerce_to_text))
            .or_else(|| obj.get("event_type").map(coerce_to_text));
        if let Some(value) = inferred {
            obj.insert("incident_type".to_string(), Value::String(value));
        }
    }

    if let Some(status) = obj.remove("immigration_status") {
        obj.entry("offender_immigration_status").or_insert(status);
    }

    let fallback_confidence = obj.get("confidence").cloned().unwrap_or(Value::from(overall_confidence));
    obj.entry("overall_confidence").or_insert(fallback_confidence);

    normalized
}

fn coerce_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_required_fields(input: &DecideInput) -> Vec<String> {
    if let Some(overridden) = &input.caller_required_fields_override {
        return overridden.clone();
    }
    if let Some(db_fields) = &input.incident_type_required_fields {
        return db_fields.clone();
    }
    if !input.category.required_fields.is_empty() {
        return input.category.required_fields.clone();
    }
    UNIVERSAL_MINIMUM_FIELDS.iter().map(|s| s.to_string()).collect()
}

fn field_is_present(data: &Value, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        _ => true,
    }
}

fn field_confidence(data: &Value, field: &str) -> f64 {
    data.get(format!("{field}_confidence"))
        .or_else(|| data.get("field_confidence").and_then(|fc| fc.get(field)))
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
}

fn severity_for(incident_type: &str) -> u8 {
    let lower = incident_type.to_lowercase();
    SEVERITY_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, severity)| *severity)
        .unwrap_or(DEFAULT_SEVERITY)
}

/// Resolve the required-field set honoring the precedence spec: caller
/// override > database-backed incident_type thresholds > category defaults
/// > static global config (exposed for approval/incident_writer callers that
/// need the set without running the whole decision cascade).
pub fn resolve_required_fields_for(
    caller_override: Option<Vec<String>>,
    db_thresholds: Option<Vec<String>>,
    category: &CategoryConfig,
) -> Vec<String> {
    resolve_required_fields(&DecideInput {
        extraction: &Value::Null,
        is_relevant: true,
        overall_confidence: 1.0,
        category,
        incident_type_required_fields: db_thresholds,
        caller_required_fields_override: caller_override,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(extraction: Value, confidence: f64, category: CategoryConfig) -> DecideInput<'static> {
        DecideInput {
            extraction: Box::leak(Box::new(extraction)),
            is_relevant: true,
            overall_confidence: confidence,
            category: Box::leak(Box::new(category)),
            incident_type_required_fields: None,
            caller_required_fields_override: None,
        }
    }

    #[test]
    fn not_relevant_auto_rejects() {
        let mut input = base_input(serde_json::json!({}), 0.9, CategoryConfig::default());
        input.is_relevant = false;
        let result = decide(input);
        assert!(matches!(result.decision, Decision::AutoReject));
    }

    #[test]
    fn confidence_below_floor_auto_rejects() {
        let input = base_input(serde_json::json!({}), 0.1, CategoryConfig::default());
        let result = decide(input);
        assert!(matches!(result.decision, Decision::AutoReject));
    }

    #[test]
    fn missing_required_field_needs_review() {
        let mut category = CategoryConfig::default();
        category.required_fields = vec!["date".to_string(), "state".to_string()];
        let input = base_input(serde_json::json!({"date": "2026-01-01"}), 0.95, category);
        let result = decide(input);
        assert!(matches!(result.decision, Decision::NeedsReview));
        assert_eq!(result.missing_fields, vec!["state".to_string()]);
    }

    #[test]
    fn low_field_confidence_needs_review() {
        let mut category = CategoryConfig::default();
        category.required_fields = vec!["date".to_string()];
        let input = base_input(
            serde_json::json!({"date": "2026-01-01", "date_confidence": 0.2}),
            0.95,
            category,
        );
        let result = decide(input);
        assert!(matches!(result.decision, Decision::NeedsReview));
        assert_eq!(result.low_confidence_fields, vec!["date".to_string()]);
    }

    #[test]
    fn high_confidence_and_severity_auto_approves() {
        let mut category = CategoryConfig::default();
        category.required_fields = vec!["date".to_string()];
        category.approve_confidence_threshold = 0.85;
        category.min_severity_auto_approve = 5;
        let input = base_input(
            serde_json::json!({"date": "2026-01-01", "incident_type": "assault"}),
            0.95,
            category,
        );
        let result = decide(input);
        assert!(matches!(result.decision, Decision::AutoApprove));
    }

    #[test]
    fn mid_confidence_needs_review() {
        let mut category = CategoryConfig::default();
        category.required_fields = vec!["date".to_string()];
        let input = base_input(serde_json::json!({"date": "2026-01-01"}), 0.6, category);
        let result = decide(input);
        assert!(matches!(result.decision, Decision::NeedsReview));
    }

    #[test]
    fn charges_first_element_is_coerced_to_incident_type() {
        let extraction = serde_json::json!({"date": "2026-01-01", "state": "TX", "charges": ["Assault"]});
        let normalized = normalize_extraction(&extraction, 0.9);
        assert_eq!(normalized["incident_type"], "Assault");
    }

    #[test]
    fn caller_override_wins_over_db_and_category_defaults() {
        let category = CategoryConfig {
            required_fields: vec!["category_default".to_string()],
            ..CategoryConfig::default()
        };
        let fields = resolve_required_fields_for(
            Some(vec!["caller_field".to_string()]),
            Some(vec!["db_field".to_string()]),
            &category,
        );
        assert_eq!(fields, vec!["caller_field".to_string()]);
    }
}
