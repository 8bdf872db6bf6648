//! Actor (entity) domain type (§3, §4.9.1 tiered entity matching).

use recordstore::{IndexValue, Record, generate_id, now_ms};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    #[default]
    Person,
    Organization,
    Agency,
    Facility,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Agency => "agency",
            Self::Facility => "facility",
        };
        write!(f, "{s}")
    }
}

/// A named participant recurring across incidents.
///
/// Duplicate actors discovered after the fact are merged by pointing
/// `merged_into` at the surviving actor rather than deleting the loser, so
/// existing incident links stay resolvable (§4.9.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub actor_type: ActorType,
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub merged_into: Option<String>,
    pub created_at: i64,
}

impl Actor {
    pub fn new(actor_type: ActorType, canonical_name: impl Into<String>) -> Self {
        Self {
            id: generate_id("actor"),
            actor_type,
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            merged_into: None,
            created_at: now_ms(),
        }
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    /// All names this actor is known by, canonical name first.
    pub fn all_names(&self) -> Vec<&str> {
        std::iter::once(self.canonical_name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }
}

impl Record for Actor {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name() -> &'static str {
        "actor"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("actor_type", IndexValue::Text(self.actor_type.to_string())),
            ("canonical_name", IndexValue::Text(self.canonical_name.clone())),
        ]
    }
}
