use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::filter::Filter;
use crate::record::{IndexValue, Record};
use crate::StoreResult;

/// A SQLite-backed store of heterogeneous [`Record`] types.
///
/// Not internally synchronized: callers that need concurrent access should
/// wrap a `Store` in an actor (a single task owning it exclusively and
/// serializing commands through a channel), matching the pattern used by
/// `ingestcore::job::store::JobStore`.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn records_table<T: Record>() -> String {
        format!("{}_records", T::type_name())
    }

    fn index_table<T: Record>() -> String {
        format!("{}_index", T::type_name())
    }

    /// Create the backing tables for `T` if they don't already exist.
    pub fn ensure_table<T: Record>(&self) -> StoreResult<()> {
        let records = Self::records_table::<T>();
        let index = Self::index_table::<T>();

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {records} (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ),
            [],
        )?;

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {index} (
                    id TEXT NOT NULL,
                    field TEXT NOT NULL,
                    value_text TEXT,
                    value_int INTEGER,
                    value_bool INTEGER,
                    PRIMARY KEY (id, field)
                )"
            ),
            [],
        )?;

        self.conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{index}_field ON {index} (field, value_text, value_int, value_bool)"),
            [],
        )?;

        Ok(())
    }

    fn write_index<T: Record>(&self, record: &T) -> StoreResult<()> {
        let index = Self::index_table::<T>();
        self.conn
            .execute(&format!("DELETE FROM {index} WHERE id = ?1"), params![record.id()])?;

        for (field, value) in record.indexed_fields() {
            let (text, int, boolean) = match value {
                IndexValue::Text(t) => (Some(t), None, None),
                IndexValue::Int(i) => (None, Some(i), None),
                IndexValue::Bool(b) => (None, None, Some(b as i64)),
            };
            self.conn.execute(
                &format!("INSERT INTO {index} (id, field, value_text, value_int, value_bool) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![record.id(), field, text, int, boolean],
            )?;
        }
        Ok(())
    }

    /// Insert a new record. Fails with a constraint violation if `id` already exists;
    /// callers that want upsert semantics should use [`Store::update`].
    pub fn insert<T: Record>(&self, record: &T) -> StoreResult<()> {
        self.ensure_table::<T>()?;
        let now = crate::record::now_ms();
        let data = serde_json::to_string(record)?;
        let table = Self::records_table::<T>();

        self.conn.execute(
            &format!("INSERT INTO {table} (id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)"),
            params![record.id(), data, now],
        )?;

        self.write_index(record)?;
        debug!(id = record.id(), type_name = T::type_name(), "recordstore: inserted");
        Ok(())
    }

    /// Upsert a record (insert if absent, overwrite if present).
    pub fn update<T: Record>(&self, record: &T) -> StoreResult<()> {
        self.ensure_table::<T>()?;
        let now = crate::record::now_ms();
        let data = serde_json::to_string(record)?;
        let table = Self::records_table::<T>();

        self.conn.execute(
            &format!(
                "INSERT INTO {table} (id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at"
            ),
            params![record.id(), data, now],
        )?;

        self.write_index(record)?;
        debug!(id = record.id(), type_name = T::type_name(), "recordstore: updated");
        Ok(())
    }

    pub fn get<T: Record>(&self, id: &str) -> StoreResult<Option<T>> {
        self.ensure_table::<T>()?;
        let table = Self::records_table::<T>();
        let data: Option<String> = self
            .conn
            .query_row(&format!("SELECT data FROM {table} WHERE id = ?1"), params![id], |row| row.get(0))
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn delete<T: Record>(&self, id: &str) -> StoreResult<bool> {
        self.ensure_table::<T>()?;
        let table = Self::records_table::<T>();
        let index = Self::index_table::<T>();
        let affected = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        self.conn
            .execute(&format!("DELETE FROM {index} WHERE id = ?1"), params![id])?;
        Ok(affected > 0)
    }

    /// List all records of type `T` matching every filter (AND semantics),
    /// ordered by insertion order, optionally capped at `limit`.
    pub fn list<T: Record>(&self, filters: &[Filter], limit: Option<usize>) -> StoreResult<Vec<T>> {
        self.ensure_table::<T>()?;
        let table = Self::records_table::<T>();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT data FROM {table} ORDER BY created_at ASC"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            let json = row?;
            let record: T = serde_json::from_str(&json)?;
            let fields = record.indexed_fields();
            if filters.iter().all(|f| f.matches(&fields)) {
                out.push(record);
                if let Some(limit) = limit
                    && out.len() >= limit
                {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub fn count<T: Record>(&self) -> StoreResult<usize> {
        self.ensure_table::<T>()?;
        let table = Self::records_table::<T>();
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Recompute the secondary index for every stored record of type `T`.
    /// Returns the number of records reindexed.
    pub fn rebuild_indexes<T: Record>(&self) -> StoreResult<usize> {
        self.ensure_table::<T>()?;
        let table = Self::records_table::<T>();
        let index = Self::index_table::<T>();
        self.conn.execute(&format!("DELETE FROM {index}"), [])?;

        let mut stmt = self.conn.prepare(&format!("SELECT data FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut n = 0usize;
        for row in rows {
            let json = row?;
            let record: T = serde_json::from_str(&json)?;
            self.write_index(&record)?;
            n += 1;
        }
        Ok(n)
    }

    /// Look up a record's id by an exact-match filter, used by callers
    /// enforcing a uniqueness invariant (e.g. `source_url` uniqueness).
    pub fn find_one<T: Record>(&self, filters: &[Filter]) -> StoreResult<Option<T>> {
        Ok(self.list::<T>(filters, Some(1))?.into_iter().next())
    }

    pub fn not_found(id: &str) -> StoreError {
        StoreError::NotFound(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        name: String,
        count: i64,
        active: bool,
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }

        fn type_name() -> &'static str {
            "widget"
        }

        fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
            vec![
                ("name", IndexValue::Text(self.name.clone())),
                ("count", IndexValue::Int(self.count)),
                ("active", IndexValue::Bool(self.active)),
            ]
        }
    }

    fn widget(id: &str, name: &str, count: i64, active: bool) -> Widget {
        Widget {
            id: id.to_string(),
            name: name.to_string(),
            count,
            active,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let w = widget("w1", "sprocket", 3, true);
        store.insert(&w).unwrap();

        let fetched: Widget = store.get("w1").unwrap().unwrap();
        assert_eq!(fetched, w);
        assert!(store.get::<Widget>("missing").unwrap().is_none());
    }

    #[test]
    fn update_is_upsert() {
        let store = Store::open_in_memory().unwrap();
        let mut w = widget("w1", "sprocket", 3, true);
        store.update(&w).unwrap();
        w.count = 9;
        store.update(&w).unwrap();

        let fetched: Widget = store.get("w1").unwrap().unwrap();
        assert_eq!(fetched.count, 9);
        assert_eq!(store.count::<Widget>().unwrap(), 1);
    }

    #[test]
    fn insert_duplicate_id_errors() {
        let store = Store::open_in_memory().unwrap();
        let w = widget("w1", "sprocket", 3, true);
        store.insert(&w).unwrap();
        assert!(store.insert(&w).is_err());
    }

    #[test]
    fn delete_removes_record_and_index() {
        let store = Store::open_in_memory().unwrap();
        let w = widget("w1", "sprocket", 3, true);
        store.insert(&w).unwrap();
        assert!(store.delete::<Widget>("w1").unwrap());
        assert!(!store.delete::<Widget>("w1").unwrap());
        assert!(store.get::<Widget>("w1").unwrap().is_none());
    }

    #[test]
    fn list_filters_by_indexed_field() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&widget("w1", "sprocket", 3, true)).unwrap();
        store.insert(&widget("w2", "gear", 5, false)).unwrap();
        store.insert(&widget("w3", "sprocket", 7, true)).unwrap();

        let sprockets = store
            .list::<Widget>(&[Filter::eq("name", "sprocket")], None)
            .unwrap();
        assert_eq!(sprockets.len(), 2);

        let high_count = store
            .list::<Widget>(&[Filter::new("count", FilterOp::Gt, 4i64)], None)
            .unwrap();
        assert_eq!(high_count.len(), 2);

        let active_sprockets = store
            .list::<Widget>(&[Filter::eq("name", "sprocket"), Filter::eq("active", true)], None)
            .unwrap();
        assert_eq!(active_sprockets.len(), 2);

        let none = store
            .list::<Widget>(&[Filter::eq("name", "sprocket"), Filter::eq("active", false)], None)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn list_respects_limit() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert(&widget(&format!("w{i}"), "x", i, true)).unwrap();
        }
        let limited = store.list::<Widget>(&[], Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn rebuild_indexes_counts_records() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store.insert(&widget(&format!("w{i}"), "x", i, true)).unwrap();
        }
        let n = store.rebuild_indexes::<Widget>().unwrap();
        assert_eq!(n, 3);

        // index still queryable after rebuild
        let all = store.list::<Widget>(&[Filter::eq("name", "x")], None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn find_one_returns_first_match() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&widget("w1", "sprocket", 3, true)).unwrap();
        let found: Option<Widget> = store.find_one(&[Filter::eq("name", "sprocket")]).unwrap();
        assert!(found.is_some());
        let missing: Option<Widget> = store.find_one(&[Filter::eq("name", "nope")]).unwrap();
        assert!(missing.is_none());
    }
}
