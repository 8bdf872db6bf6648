//! Incident domain types and link tables (§3, §4.11).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    PendingReview,
    Approved,
    Rejected,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Canonical, deduplicated incident (§4.8 merge target, §4.9 dedup target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub domain: String,
    pub category: Option<String>,
    pub title: String,
    pub summary: String,
    pub occurred_at: Option<i64>,
    pub location: Option<String>,
    pub severity: Option<String>,
    pub confidence: f64,
    pub status: IncidentStatus,
    /// Opaque per-schema payload (§9 dynamic bag escape hatch).
    pub custom_fields: Value,
    pub merge_info: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Incident {
    pub fn new(domain: impl Into<String>, title: impl Into<String>, summary: impl Into<String>, confidence: f64) -> Self {
        let now = now_ms();
        Self {
            id: generate_id("incident"),
            domain: domain.into(),
            category: None,
            title: title.into(),
            summary: summary.into(),
            occurred_at: None,
            location: None,
            severity: None,
            confidence,
            status: IncidentStatus::PendingReview,
            custom_fields: Value::Null,
            merge_info: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

impl Record for Incident {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "incident"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        let mut fields = vec![
            ("domain", IndexValue::Text(self.domain.clone())),
            ("status", IndexValue::Text(self.status.to_string())),
            ("created_at", IndexValue::Int(self.created_at)),
        ];
        if let Some(category) = &self.category {
            fields.push(("category", IndexValue::Text(category.clone())));
        }
        fields
    }
}

/// A dated occurrence within an incident's narrative (e.g. arrest, hearing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub incident_id: String,
    pub event_type: String,
    pub description: String,
    pub occurred_at: Option<i64>,
    pub created_at: i64,
}

impl Event {
    pub fn new(incident_id: impl Into<String>, event_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: generate_id("event"),
            incident_id: incident_id.into(),
            event_type: event_type.into(),
            description: description.into(),
            occurred_at: None,
            created_at: now_ms(),
        }
    }
}

impl Record for Event {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "event"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("incident_id", IndexValue::Text(self.incident_id.clone())),
            ("event_type", IndexValue::Text(self.event_type.clone())),
        ]
    }
}

/// `(incident_id, actor_id)` link, deterministic id so re-linking is an
/// upsert rather than a duplicate row (§4.11 idempotent writer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentActorLink {
    pub id: String,
    pub incident_id: String,
    pub actor_id: String,
    pub role: Option<String>,
    pub created_at: i64,
}

impl IncidentActorLink {
    pub fn composite_id(incident_id: &str, actor_id: &str) -> String {
        format!("ial_{incident_id}_{actor_id}")
    }

    pub fn new(incident_id: impl Into<String>, actor_id: impl Into<String>, role: Option<String>) -> Self {
        let incident_id = incident_id.into();
        let actor_id = actor_id.into();
        let id = Self::composite_id(&incident_id, &actor_id);
        Self {
            id,
            incident_id,
            actor_id,
            role,
            created_at: now_ms(),
        }
    }
}

impl Record for IncidentActorLink {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "incident_actor_link"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("incident_id", IndexValue::Text(self.incident_id.clone())),
            ("actor_id", IndexValue::Text(self.actor_id.clone())),
        ]
    }
}

/// `(incident_id, event_id)` link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEventLink {
    pub id: String,
    pub incident_id: String,
    pub event_id: String,
    pub created_at: i64,
}

impl IncidentEventLink {
    pub fn composite_id(incident_id: &str, event_id: &str) -> String {
        format!("iel_{incident_id}_{event_id}")
    }

    pub fn new(incident_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        let incident_id = incident_id.into();
        let event_id = event_id.into();
        let id = Self::composite_id(&incident_id, &event_id);
        Self {
            id,
            incident_id,
            event_id,
            created_at: now_ms(),
        }
    }
}

impl Record for IncidentEventLink {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "incident_event_link"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("incident_id", IndexValue::Text(self.incident_id.clone())),
            ("event_id", IndexValue::Text(self.event_id.clone())),
        ]
    }
}

/// `(incident_id, article_id)` link back to the source article(s) that
/// produced or corroborated an incident (§4.9 cross-source dedup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSourceLink {
    pub id: String,
    pub incident_id: String,
    pub article_id: String,
    pub created_at: i64,
}

impl IncidentSourceLink {
    pub fn composite_id(incident_id: &str, article_id: &str) -> String {
        format!("isl_{incident_id}_{article_id}")
    }

    pub fn new(incident_id: impl Into<String>, article_id: impl Into<String>) -> Self {
        let incident_id = incident_id.into();
        let article_id = article_id.into();
        let id = Self::composite_id(&incident_id, &article_id);
        Self {
            id,
            incident_id,
            article_id,
            created_at: now_ms(),
        }
    }
}

impl Record for IncidentSourceLink {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "incident_source_link"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("incident_id", IndexValue::Text(self.incident_id.clone())),
            ("article_id", IndexValue::Text(self.article_id.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_ids_are_deterministic_for_same_pair() {
        let a = IncidentActorLink::new("incident_1", "actor_1", None);
        let b = IncidentActorLink::new("incident_1", "actor_1", Some("victim".to_string()));
        assert_eq!(a.id, b.id, "same incident/actor pair must map to the same link id");
    }

    #[test]
    fn incident_touch_updates_timestamp() {
        let mut incident = Incident::new("immigration_enforcement", "Raid in Dallas", "summary", 0.8);
        let created = incident.updated_at;
        incident.touch();
        assert!(incident.updated_at >= created);
    }
}
