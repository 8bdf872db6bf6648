use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};

/// A typed value usable in a secondary index column.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum IndexValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Text(v)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Int(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        IndexValue::Bool(v)
    }
}

/// A record persisted by a [`crate::Store`].
///
/// `type_name()` names the SQLite table (`<type_name>_records`); `id()` is
/// the primary key; `indexed_fields()` lists the columns a caller may filter
/// on via [`crate::Filter`] without a full-table deserialize.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn type_name() -> &'static str
    where
        Self: Sized;

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)>;
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a prefixed, content-seeded id: `<prefix>_<uuid-v7>`.
///
/// Mirrors the teacher's `domain::id::generate_id` convention of a readable
/// prefix over a raw UUID so log lines stay scannable (`job_01973...`
/// vs. a bare UUID).
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::now_v7())
}
