//! Incident Writer (§4.11): turns one merged, approved extraction into an
//! idempotent incident + actor + event write.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use recordstore::{Filter, Store, StoreError};

use crate::domain::{Actor, ActorType, Event, Incident, IncidentActorLink, IncidentEventLink, IncidentSourceLink};
use crate::merge::{MergeInfo, SourceRole};

const VALIDATABLE_FIELDS: &[&str] = &["date", "state", "incident_type", "victim_category", "outcome_category"];

/// Legacy CJ/CR subcategory mapping (§4.11): every criminal-justice
/// subcategory collapses to `crime`, every civil-rights subcategory to
/// `enforcement`.
const CJ_SUBCATEGORIES: &[&str] = &["assault", "theft", "homicide", "robbery", "battery", "dui"];
const CR_SUBCATEGORIES: &[&str] = &["detention", "deportation", "raid", "arrest", "removal"];

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("missing required field for write: {0}")]
    MissingRequiredField(String),
}

pub type WriterResult<T> = Result<T, WriterError>;

#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub name: String,
    pub actor_type: ActorType,
    pub role: Option<String>,
}

pub struct WriteRequest<'a> {
    pub extracted_data: Value,
    pub article_id: &'a str,
    pub domain_slug: &'a str,
    pub confidence: f64,
    pub merge_info: Option<&'a MergeInfo>,
    pub schema_required_fields: &'a [(String, Vec<String>)],
    pub actors: Vec<ActorSpec>,
    pub events: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub incident_id: String,
    pub actors_created: usize,
    pub category: String,
}

/// `create_incident(...)` (§4.11). Idempotent: the incident id is derived
/// from `article_id` so re-running the writer for the same article upserts
/// the same row instead of duplicating it.
pub fn create_incident(store: &Store, request: WriteRequest) -> WriterResult<WriteOutcome> {
    let required = resolve_validatable_required_fields(&request);
    for field in &required {
        if !field_is_present(&request.extracted_data, field) {
            return Err(WriterError::MissingRequiredField(field.clone()));
        }
    }

    let category = legacy_category(&request);
    let title = incident_title(&request.extracted_data, &category);
    let summary = request
        .extracted_data
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let mut incident = Incident::new(request.domain_slug, title, summary, request.confidence);
    incident.id = format!("incident_{}", request.article_id);
    incident.category = Some(category.clone());
    incident.occurred_at = request
        .extracted_data
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok());
    incident.location = request.extracted_data.get("state").and_then(Value::as_str).map(str::to_string);
    incident.custom_fields = filtered_policy_context(&request.extracted_data);
    incident.merge_info = request
        .merge_info
        .map(|info| serde_json::json!({"merged": info.merged, "cluster_entity": info.cluster_entity, "schemas_merged": info.schemas_merged}))
        .unwrap_or(Value::Null);
    store.update(&incident)?;

    store.update(&IncidentSourceLink::new(incident.id.clone(), request.article_id))?;

    let mut actors_created = 0usize;
    for spec in &request.actors {
        let (actor, created) = find_or_create_actor(store, spec)?;
        if created {
            actors_created += 1;
        }
        store.update(&IncidentActorLink::new(incident.id.clone(), actor.id.clone(), spec.role.clone()))?;
    }

    for (event_type, description) in &request.events {
        let event = Event::new(incident.id.clone(), event_type.clone(), description.clone());
        let link = IncidentEventLink::new(incident.id.clone(), event.id.clone());
        if store.get::<IncidentEventLink>(&link.id)?.is_none() {
            store.insert(&event)?;
            store.insert(&link)?;
        }
    }

    Ok(WriteOutcome {
        incident_id: incident.id,
        actors_created,
        category,
    })
}

/// Union of `required_fields` across every schema named in `merge_info.sources`,
/// intersected with the writer's validatable set; falls back to the universal
/// minimums when no merge info is available.
fn resolve_validatable_required_fields(request: &WriteRequest) -> Vec<String> {
    let mut union: HashSet<String> = HashSet::new();

    if let Some(info) = request.merge_info {
        let contributing: HashSet<&str> = info.sources.iter().map(|s| s.schema_name.as_str()).collect();
        for (schema_name, fields) in request.schema_required_fields {
            if contributing.contains(schema_name.as_str()) {
                union.extend(fields.iter().cloned());
            }
        }
    }

    if union.is_empty() {
        union.insert("date".to_string());
        union.insert("state".to_string());
    }

    union.into_iter().filter(|f| VALIDATABLE_FIELDS.contains(&f.as_str())).collect()
}

fn field_is_present(data: &Value, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        _ => true,
    }
}

/// `domain_id`/`category_id` derivation precedence (§4.11): merge_info source
/// category, then the first classification hint's category, then the first
/// extracted category, finally the legacy CJ/CR subcategory mapping.
fn legacy_category(request: &WriteRequest) -> String {
    if let Some(info) = request.merge_info {
        if let Some(base_source) = info.sources.iter().find(|s| s.role == SourceRole::Base || s.role == SourceRole::Sole) {
            if let Some(mapped) = map_subcategory(&base_source.schema_name) {
                return mapped;
            }
        }
    }

    if let Some(categories) = request.extracted_data.get("categories").and_then(Value::as_array) {
        if let Some(first) = categories.first().and_then(Value::as_str) {
            if let Some(mapped) = map_subcategory(first) {
                return mapped;
            }
        }
    }

    if let Some(incident_type) = request.extracted_data.get("incident_type").and_then(Value::as_str) {
        if let Some(mapped) = map_subcategory(incident_type) {
            return mapped;
        }
    }

    "enforcement".to_string()
}

fn map_subcategory(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if CJ_SUBCATEGORIES.iter().any(|s| lower.contains(s)) {
        return Some("crime".to_string());
    }
    if CR_SUBCATEGORIES.iter().any(|s| lower.contains(s)) {
        return Some("enforcement".to_string());
    }
    None
}

fn incident_title(data: &Value, category: &str) -> String {
    let subject = data
        .get("offender_name")
        .or_else(|| data.get("victim_name"))
        .and_then(Value::as_str)
        .unwrap_or("Unnamed individual");
    let state = data.get("state").and_then(Value::as_str).unwrap_or("unknown location");
    format!("{category} incident involving {subject} in {state}")
}

/// `custom_fields = filtered policy_context` (§4.11): keep only the
/// string/number/bool leaves, dropping anything that isn't safe to surface
/// as opaque metadata.
fn filtered_policy_context(data: &Value) -> Value {
    let Some(context) = data.get("policy_context").and_then(Value::as_object) else {
        return Value::Null;
    };
    let filtered: serde_json::Map<String, Value> = context
        .iter()
        .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

/// Case-insensitive canonical_name or alias match; creates a new actor when
/// nothing matches.
fn find_or_create_actor(store: &Store, spec: &ActorSpec) -> WriterResult<(Actor, bool)> {
    let candidates: Vec<Actor> = store.list(&[Filter::eq("actor_type", spec.actor_type.to_string())], None)?;
    let needle = spec.name.to_lowercase();
    if let Some(existing) = candidates.into_iter().find(|a| a.all_names().iter().any(|n| n.to_lowercase() == needle)) {
        return Ok((existing, false));
    }

    let actor = Actor::new(spec.actor_type, spec.name.clone());
    store.insert(&actor)?;
    Ok((actor, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::Source;

    fn test_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.ensure_table::<Incident>().unwrap();
        store.ensure_table::<Actor>().unwrap();
        store.ensure_table::<Event>().unwrap();
        store.ensure_table::<IncidentActorLink>().unwrap();
        store.ensure_table::<IncidentEventLink>().unwrap();
        store.ensure_table::<IncidentSourceLink>().unwrap();
        store
    }

    fn base_request(data: Value) -> WriteRequest<'static> {
        WriteRequest {
            extracted_data: data,
            article_id: Box::leak(Box::new("article_1".to_string())),
            domain_slug: "immigration",
            confidence: 0.9,
            merge_info: None,
            schema_required_fields: Box::leak(Box::new(Vec::new())),
            actors: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn missing_universal_minimum_errors() {
        let store = test_store();
        let request = base_request(serde_json::json!({"date": "2026-01-01"}));
        let result = create_incident(&store, request);
        assert!(matches!(result, Err(WriterError::MissingRequiredField(_))));
    }

    #[test]
    fn well_formed_request_creates_incident_and_actor() {
        let store = test_store();
        let mut request = base_request(serde_json::json!({"date": "2026-01-01", "state": "TX", "offender_name": "Juan Perez"}));
        request.actors = vec![ActorSpec {
            name: "Juan Perez".to_string(),
            actor_type: ActorType::Person,
            role: Some("offender".to_string()),
        }];
        let outcome = create_incident(&store, request).unwrap();
        assert_eq!(outcome.actors_created, 1);
        assert_eq!(outcome.category, "enforcement");
    }

    #[test]
    fn rerunning_for_same_article_reuses_actor_and_is_idempotent() {
        let store = test_store();
        let mut first = base_request(serde_json::json!({"date": "2026-01-01", "state": "TX", "offender_name": "Juan Perez"}));
        first.actors = vec![ActorSpec {
            name: "Juan Perez".to_string(),
            actor_type: ActorType::Person,
            role: Some("offender".to_string()),
        }];
        let outcome_one = create_incident(&store, first).unwrap();

        let mut second = base_request(serde_json::json!({"date": "2026-01-01", "state": "TX", "offender_name": "juan perez"}));
        second.actors = vec![ActorSpec {
            name: "juan perez".to_string(),
            actor_type: ActorType::Person,
            role: Some("offender".to_string()),
        }];
        let outcome_two = create_incident(&store, second).unwrap();

        assert_eq!(outcome_one.incident_id, outcome_two.incident_id);
        assert_eq!(outcome_two.actors_created, 0, "case-insensitive alias match must reuse the existing actor");
    }

    #[test]
    fn cj_schema_maps_to_crime_category() {
        let store = test_store();
        let mut request = base_request(serde_json::json!({"date": "2026-01-01", "state": "TX"}));
        request.merge_info = Some(Box::leak(Box::new(MergeInfo {
            sources: vec![Source {
                schema_name: "assault_v1".to_string(),
                role: SourceRole::Sole,
                fields_contributed: Vec::new(),
            }],
            cluster_entity: None,
            merged: false,
            schemas_merged: vec!["assault_v1".to_string()],
        })));
        let outcome = create_incident(&store, request).unwrap();
        assert_eq!(outcome.category, "crime");
    }
}
