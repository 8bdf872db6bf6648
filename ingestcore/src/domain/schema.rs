//! Extraction schema domain type (§3, §4.7 schema selection).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad domain a schema applies to, e.g. "immigration_enforcement".
pub type Domain = String;
/// Sub-category within a domain, e.g. "detention".
pub type Category = String;

/// Which extraction pass a schema drives (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Stage1,
    Stage2,
}

/// JSON type a field is expected to hold, used to coerce loosely-typed LLM
/// output before scoring (§4.7: "validate and coerce fields against schema
/// `field_definitions`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
}

/// A versioned Stage 1 or Stage 2 extraction schema.
///
/// Exactly one row per `(domain, category, schema_type)` may have
/// `is_production` set; callers rely on this to pick the schema a new
/// article gets matched against without ambiguity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub id: String,
    pub name: String,
    pub schema_type: SchemaType,
    pub domain: Domain,
    pub category: Option<Category>,
    pub version: i64,
    pub json_schema: Value,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub field_definitions: Vec<FieldDefinition>,
    /// Static instructions sent as the provider's system prompt.
    pub system_prompt: String,
    /// Template substituted with `{article_text}`/`{stage1_output}`/
    /// `{domain_relevance_criteria}` and sent as the user message.
    pub user_prompt_template: String,
    pub model_name: String,
    pub is_active: bool,
    pub is_production: bool,
    pub created_at: i64,
}

impl ExtractionSchema {
    pub fn new(
        name: impl Into<String>,
        schema_type: SchemaType,
        domain: impl Into<String>,
        json_schema: Value,
        system_prompt: impl Into<String>,
        user_prompt_template: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id("schema"),
            name: name.into(),
            schema_type,
            domain: domain.into(),
            category: None,
            version: 1,
            json_schema,
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            field_definitions: Vec::new(),
            system_prompt: system_prompt.into(),
            user_prompt_template: user_prompt_template.into(),
            model_name: model_name.into(),
            is_active: true,
            is_production: false,
            created_at: now_ms(),
        }
    }

    /// Usable by the schema-selection algorithm: active and marked production.
    pub fn is_selectable(&self) -> bool {
        self.is_active && self.is_production
    }
}

impl Record for ExtractionSchema {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "extraction_schema"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        let mut fields = vec![
            ("domain", IndexValue::Text(self.domain.clone())),
            ("is_active", IndexValue::Bool(self.is_active)),
            ("is_production", IndexValue::Bool(self.is_production)),
        ];
        if let Some(category) = &self.category {
            fields.push(("category", IndexValue::Text(category.clone())));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> ExtractionSchema {
        ExtractionSchema::new(
            "detention_v1",
            SchemaType::Stage2,
            "immigration_enforcement",
            Value::Null,
            "You extract structured incident data.",
            "extract {article_text}",
            "claude-sonnet-4-20250514",
        )
    }

    #[test]
    fn new_schema_is_active_but_not_production() {
        let schema = test_schema();
        assert!(schema.is_active);
        assert!(!schema.is_production);
        assert!(!schema.is_selectable());
    }

    #[test]
    fn selectable_requires_active_and_production() {
        let mut schema = test_schema();
        schema.is_production = true;
        assert!(schema.is_selectable());
        schema.is_active = false;
        assert!(!schema.is_selectable());
    }
}
