//! Ingested article domain type (§3).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    #[default]
    Pending,
    Processing,
    Extracted,
    Approved,
    Rejected,
    Archived,
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Extracted => "extracted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPipeline {
    Legacy,
    TwoStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedArticle {
    pub id: String,
    pub source_id: String,
    pub source_url: String,
    pub content_hash: Option<String>,
    pub title: String,
    pub content: String,
    pub fetched_at: i64,
    pub published_at: Option<i64>,
    pub status: ArticleStatus,
    /// Opaque structured result with confidence + merge_info (§4.8).
    pub extracted_data: Option<Value>,
    pub latest_extraction_id: Option<String>,
    pub extraction_pipeline: Option<ExtractionPipeline>,
    pub extraction_error_count: u32,
    pub last_extraction_error: Option<String>,
    pub last_extraction_error_at: Option<i64>,
    pub last_extraction_error_category: Option<String>,
}

impl IngestedArticle {
    pub fn new(source_id: impl Into<String>, source_url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: generate_id("article"),
            source_id: source_id.into(),
            source_url: source_url.into(),
            content_hash: None,
            title: title.into(),
            content: content.into(),
            fetched_at: now_ms(),
            published_at: None,
            status: ArticleStatus::Pending,
            extracted_data: None,
            latest_extraction_id: None,
            extraction_pipeline: None,
            extraction_error_count: 0,
            last_extraction_error: None,
            last_extraction_error_at: None,
            last_extraction_error_category: None,
        }
    }

    pub fn record_extraction_error(&mut self, category: &str, message: impl Into<String>) {
        self.extraction_error_count += 1;
        self.last_extraction_error = Some(message.into());
        self.last_extraction_error_at = Some(now_ms());
        self.last_extraction_error_category = Some(category.to_string());
    }
}

impl Record for IngestedArticle {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "ingested_article"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        let mut fields = vec![
            ("status", IndexValue::Text(self.status.to_string())),
            ("source_url", IndexValue::Text(self.source_url.clone())),
            ("source_id", IndexValue::Text(self.source_id.clone())),
        ];
        if let Some(hash) = &self.content_hash {
            fields.push(("content_hash", IndexValue::Text(hash.clone())));
        }
        fields
    }
}
