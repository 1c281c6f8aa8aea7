pub mod capability;
pub mod config;
pub mod error;
pub mod filter;
pub mod index;
pub mod model;
pub mod parser;
pub mod procedures;
pub mod reconciler;
pub mod remote;
pub mod storage;
pub mod store;
pub mod table;

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::index::UniqueIndex;
use crate::model::Row;
use crate::store::RecordStore;

/// Server-side procedure body.
pub type Procedure = Arc<dyn Fn(&RosterDb, &Value) -> Result<Value, StoreError> + Send + Sync>;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    indexes: Vec<UniqueIndex>,
}

impl Table {
    fn new(name: &str, unique: &[&[&str]]) -> Self {
        let mut indexes = vec![UniqueIndex::new(&format!("{}_pkey", name), &["id"])];
        for (i, cols) in unique.iter().enumerate() {
            indexes.push(UniqueIndex::new(&format!("{}_unique_{}", name, i), cols));
        }
        Self { rows: Vec::new(), indexes }
    }

    fn insert(&mut self, name: &str, mut row: Row) -> Result<Row, StoreError> {
        let id = match row.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".into(), Value::String(id.clone()));
                id
            }
        };

        for idx in &self.indexes {
            idx.check(name, &row, &id)?;
        }
        for idx in &mut self.indexes {
            idx.insert(&row, &id);
        }
        self.rows.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, name: &str, filters: &[Filter], patch: &Row) -> Result<Vec<Row>, StoreError> {
        let hits: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| filters.iter().all(|f| f.matches(r)))
            .map(|(i, _)| i)
            .collect();

        if hits.is_empty() {
            return Err(StoreError::NotFound(format!("no '{}' row matches the filters", name)));
        }

        // Stage the whole batch on copies of the indexes so rows patched
        // together are checked against each other too.
        let mut staged = self.indexes.clone();
        for &i in &hits {
            for idx in &mut staged {
                idx.remove(&self.rows[i]);
            }
        }

        let mut patched = Vec::with_capacity(hits.len());
        for &i in &hits {
            let old = &self.rows[i];
            let id = model::text(old, "id").unwrap_or_default();
            let mut new = old.clone();
            for (k, v) in patch {
                if k != "id" {
                    new.insert(k.clone(), v.clone());
                }
            }
            for idx in &mut staged {
                idx.check(name, &new, &id)?;
                idx.insert(&new, &id);
            }
            patched.push((i, new));
        }

        self.indexes = staged;
        let mut out = Vec::with_capacity(patched.len());
        for (i, new) in patched {
            self.rows[i] = new.clone();
            out.push(new);
        }
        Ok(out)
    }

    fn clear(&mut self) {
        self.rows.clear();
        for idx in &mut self.indexes {
            idx.clear();
        }
    }
}

/// In-memory relational record store: named tables with unique
/// constraints plus a registry of server-side procedures.
pub struct RosterDb {
    tables: RwLock<HashMap<String, Table>>,
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl fmt::Debug for RosterDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read().map(|t| t.len()).unwrap_or(0);
        let procedures = self.procedures.read().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("RosterDb")
            .field("tables", &tables)
            .field("procedures", &procedures)
            .finish()
    }
}

impl Default for RosterDb {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::rejected("internal", "poisoned lock")
}

impl RosterDb {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            procedures: RwLock::new(HashMap::new()),
        }
    }

    /// Creates `name` with a primary key on `id` and one unique constraint
    /// per entry of `unique`. Existing tables are left as they are.
    pub fn create_table(&self, name: &str, unique: &[&[&str]]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.entry(name.to_string()).or_insert_with(|| Table::new(name, unique));
        Ok(())
    }

    pub fn register_procedure(&self, name: &str, body: Procedure) -> Result<(), StoreError> {
        let mut procs = self.procedures.write().map_err(poisoned)?;
        procs.insert(name.to_string(), body);
        Ok(())
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.read().map(|p| p.contains_key(name)).unwrap_or(false)
    }

    pub fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let t = tables.get(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(query.apply(&t.rows))
    }

    pub fn insert_row(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let t = tables.get_mut(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        t.insert(table, row)
    }

    pub fn update_rows(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let t = tables.get_mut(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        t.update(table, filters, patch)
    }

    pub fn call(&self, name: &str, args: &Value) -> Result<Value, StoreError> {
        // Clone the body out so the procedure can take table locks itself.
        let body = {
            let procs = self.procedures.read().map_err(poisoned)?;
            procs.get(name).cloned()
        };
        match body {
            Some(f) => f(self, args),
            None => Err(StoreError::UnsupportedProcedure(name.to_string())),
        }
    }

    // --- SNAPSHOTS ---

    /// Every table's rows as one JSON object.
    pub fn snapshot(&self) -> Result<Value, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut out = Map::new();
        for (name, t) in tables.iter() {
            out.insert(name.clone(), Value::Array(t.rows.iter().cloned().map(Value::Object).collect()));
        }
        Ok(Value::Object(out))
    }

    /// Replaces the contents of every table named in `snapshot`. Unknown
    /// tables are created without extra constraints.
    pub fn restore(&self, snapshot: &Value) -> Result<usize, StoreError> {
        let Value::Object(map) = snapshot else {
            return Err(StoreError::rejected("decode", "snapshot must be a JSON object"));
        };

        let mut tables = self.tables.write().map_err(poisoned)?;
        let mut count = 0;
        for (name, rows) in map {
            let Value::Array(rows) = rows else {
                return Err(StoreError::rejected("decode", format!("table '{}' is not an array", name)));
            };
            let t = tables.entry(name.clone()).or_insert_with(|| Table::new(name, &[]));
            t.clear();
            for r in rows {
                let Value::Object(r) = r else {
                    return Err(StoreError::rejected("decode", format!("row in '{}' is not an object", name)));
                };
                t.insert(name, r.clone())?;
                count += 1;
            }
        }
        tracing::info!(rows = count, "restored snapshot");
        Ok(count)
    }
}

impl RecordStore for RosterDb {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.select(table, query)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        self.insert_row(table, row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        self.update_rows(table, filters, &patch)
    }

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        self.call(name, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::row;
    use serde_json::json;

    fn db() -> RosterDb {
        let db = RosterDb::new();
        db.create_table("tags", &[&["name"]]).unwrap();
        db
    }

    #[test]
    fn insert_generates_id_and_enforces_unique() {
        let db = db();
        let r = db.insert_row("tags", row([("name", json!("cliente"))])).unwrap();
        assert!(r.contains_key("id"));

        let err = db.insert_row("tags", row([("name", json!("cliente"))])).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(db.select("tags", &Query::new()).unwrap().len(), 1);
    }

    #[test]
    fn update_without_match_is_not_found() {
        let db = db();
        let err = db
            .update_rows("tags", &[Filter::eq("name", "x")], &row([("active", json!(false))]))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn update_rejecting_conflict_leaves_rows_untouched() {
        let db = db();
        db.insert_row("tags", row([("id", json!("1")), ("name", json!("a"))])).unwrap();
        db.insert_row("tags", row([("id", json!("2")), ("name", json!("b"))])).unwrap();

        let err = db
            .update_rows("tags", &[Filter::eq("id", "2")], &row([("name", json!("a"))]))
            .unwrap_err();
        assert!(err.is_conflict());
        let b = db.select("tags", &Query::new().eq("id", "2")).unwrap();
        assert_eq!(b[0]["name"], json!("b"));

        // renaming frees the old key
        db.update_rows("tags", &[Filter::eq("id", "2")], &row([("name", json!("c"))])).unwrap();
        db.insert_row("tags", row([("name", json!("b"))])).unwrap();
    }

    #[test]
    fn update_giving_two_rows_one_key_conflicts() {
        let db = db();
        db.insert_row("tags", row([("id", json!("1")), ("name", json!("a")), ("grp", json!(1))])).unwrap();
        db.insert_row("tags", row([("id", json!("2")), ("name", json!("b")), ("grp", json!(1))])).unwrap();

        let err = db
            .update_rows("tags", &[Filter::eq("grp", 1)], &row([("name", json!("same"))]))
            .unwrap_err();
        assert!(err.is_conflict(), "{:?}", err);
        assert!(db.select("tags", &Query::new().eq("name", "same")).unwrap().is_empty());

        // the index was left alone, so the old names still conflict
        assert!(db.insert_row("tags", row([("name", json!("a"))])).unwrap_err().is_conflict());
    }

    #[test]
    fn unknown_procedure_is_unsupported() {
        let db = db();
        let err = db.call("nope", &json!({})).unwrap_err();
        assert_eq!(err, StoreError::UnsupportedProcedure("nope".into()));
    }

    #[test]
    fn snapshot_restores_into_fresh_db() {
        let db = db();
        db.insert_row("tags", row([("name", json!("a"))])).unwrap();
        let snap = db.snapshot().unwrap();

        let fresh = RosterDb::new();
        fresh.create_table("tags", &[&["name"]]).unwrap();
        assert_eq!(fresh.restore(&snap).unwrap(), 1);
        assert!(fresh.insert_row("tags", row([("name", json!("a"))])).unwrap_err().is_conflict());
    }
}
