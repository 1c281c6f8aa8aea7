use std::collections::HashMap;

use crate::error::StoreError;
use crate::filter::canonical;
use crate::model::Row;

/// Uniqueness constraint over a tuple of columns.
///
/// Rows with a null in any indexed column are not indexed, the same way SQL
/// unique constraints ignore nulls.
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    pub name: String,
    pub columns: Vec<String>,
    entries: HashMap<Vec<String>, String>,
}

impl UniqueIndex {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            entries: HashMap::new(),
        }
    }

    fn key_of(&self, row: &Row) -> Option<Vec<String>> {
        self.columns
            .iter()
            .map(|c| row.get(c).and_then(canonical))
            .collect()
    }

    /// Fails with `Conflict` when another row (not `row_id`) already holds
    /// the same key.
    pub fn check(&self, table: &str, row: &Row, row_id: &str) -> Result<(), StoreError> {
        let Some(key) = self.key_of(row) else { return Ok(()) };
        match self.entries.get(&key) {
            Some(owner) if owner != row_id => Err(StoreError::Conflict {
                table: table.to_string(),
                constraint: self.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, row: &Row, row_id: &str) {
        if let Some(key) = self.key_of(row) {
            self.entries.insert(key, row_id.to_string());
        }
    }

    pub fn remove(&mut self, row: &Row) {
        if let Some(key) = self.key_of(row) {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::row;
    use serde_json::{json, Value};

    #[test]
    fn composite_key_conflicts_only_for_other_rows() {
        let mut idx = UniqueIndex::new("entity_tag", &["entity_id", "tag_id"]);
        let r = row([("entity_id", json!("e1")), ("tag_id", json!("t1"))]);
        idx.insert(&r, "a1");

        assert!(idx.check("entity_tags", &r, "a1").is_ok());
        let err = idx.check("entity_tags", &r, "a2").unwrap_err();
        assert!(err.is_conflict());

        let other = row([("entity_id", json!("e1")), ("tag_id", json!("t2"))]);
        assert!(idx.check("entity_tags", &other, "a2").is_ok());
    }

    #[test]
    fn null_columns_are_not_indexed() {
        let mut idx = UniqueIndex::new("tag_name", &["name"]);
        let r = row([("name", Value::Null)]);
        idx.insert(&r, "t1");
        assert!(idx.is_empty());
        assert!(idx.check("tags", &r, "t2").is_ok());
    }
}
