//! Stage 1 / Stage 2 extraction domain types (§3, §4.6, §4.7).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::span::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    /// Stage 2 only: superseded by a later re-extraction (§4.7 supersedence).
    Superseded,
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

/// A `{domain_slug, category_slug, confidence}` tuple emitted by Stage 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationHint {
    pub domain_slug: String,
    pub category_slug: Option<String>,
    pub confidence: f64,
}

/// Stage 1's opinion on whether (and how confidently) a domain applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRelevance {
    pub domain_slug: String,
    pub is_relevant: bool,
    pub confidence: f64,
}

/// Stage 1 intermediate-representation extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Row {
    pub id: String,
    pub article_id: String,
    pub extraction_data: Value,
    pub entity_count: u32,
    pub event_count: u32,
    pub overall_confidence: f64,
    pub classification_hints: Vec<ClassificationHint>,
    pub domain_relevance: Vec<DomainRelevance>,
    pub status: ExtractionStatus,
    pub stage1_schema_version: i64,
    pub stage1_prompt_hash: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub extraction_notes: Option<String>,
    pub created_at: i64,
}

impl Stage1Row {
    pub fn new_pending(article_id: impl Into<String>, schema_version: i64, prompt_hash: impl Into<String>) -> Self {
        Self {
            id: generate_id("stage1"),
            article_id: article_id.into(),
            extraction_data: Value::Null,
            entity_count: 0,
            event_count: 0,
            overall_confidence: 0.0,
            classification_hints: Vec::new(),
            domain_relevance: Vec::new(),
            status: ExtractionStatus::Pending,
            stage1_schema_version: schema_version,
            stage1_prompt_hash: prompt_hash.into(),
            provider: None,
            model: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
            error: None,
            extraction_notes: None,
            created_at: now_ms(),
        }
    }
}

impl Record for Stage1Row {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "article_extraction"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("article_id", IndexValue::Text(self.article_id.clone())),
            ("status", IndexValue::Text(self.status.to_string())),
            ("created_at", IndexValue::Int(self.created_at)),
        ]
    }
}

/// Stage 2 per-schema extraction result, unique on `(stage1_row_id, schema_id)` (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Row {
    pub id: String,
    pub stage1_row_id: String,
    pub schema_id: String,
    pub extracted_data: Value,
    pub source_spans: Vec<SourceSpan>,
    pub confidence: f64,
    pub validation_errors: Vec<String>,
    pub status: ExtractionStatus,
    pub stage1_version: i64,
    pub used_original_text: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency_ms: Option<u64>,
    pub created_at: i64,
}

impl Stage2Row {
    /// Deterministic id so `(stage1_row_id, schema_id)` uniqueness can be
    /// enforced by upsert rather than a query-then-check race.
    pub fn composite_id(stage1_row_id: &str, schema_id: &str) -> String {
        format!("stage2_{stage1_row_id}_{schema_id}")
    }

    pub fn new(stage1_row_id: impl Into<String>, schema_id: impl Into<String>, stage1_version: i64) -> Self {
        let stage1_row_id = stage1_row_id.into();
        let schema_id = schema_id.into();
        let id = Self::composite_id(&stage1_row_id, &schema_id);
        Self {
            id,
            stage1_row_id,
            schema_id,
            extracted_data: Value::Null,
            source_spans: Vec::new(),
            confidence: 0.0,
            validation_errors: Vec::new(),
            status: ExtractionStatus::Pending,
            stage1_version,
            used_original_text: false,
            provider: None,
            model: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
            created_at: now_ms(),
        }
    }
}

impl Record for Stage2Row {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "schema_extraction_result"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("stage1_row_id", IndexValue::Text(self.stage1_row_id.clone())),
            ("schema_id", IndexValue::Text(self.schema_id.clone())),
            ("status", IndexValue::Text(self.status.to_string())),
        ]
    }
}
