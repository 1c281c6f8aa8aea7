use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StoreError;

/// One row as it travels through the record store.
pub type Row = Map<String, Value>;

/// Unix seconds, the unit for every tenure stamp.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Period during which an assignment counts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenure {
    pub started_at: u64,
    /// `None` while the assignment is current
    pub ended_at: Option<u64>,
}

/// A named category attachable to entities.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// Relationship row between an entity and a tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TagAssignment {
    pub id: String,
    pub entity_id: String,
    pub tag_id: String,
    pub active: bool,
    pub tenure: Tenure,
}

/// Entity listing row used by the bulk editors: the entity plus the names of
/// its active tags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EntityWithTags {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: String,
}

impl EntityWithTags {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }
}

// --- Row accessors ---

pub fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn flag(row: &Row, column: &str) -> bool {
    match row.get(column) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

pub fn stamp(row: &Row, column: &str) -> Option<u64> {
    row.get(column).and_then(Value::as_u64)
}

fn required(row: &Row, column: &str) -> Result<String, StoreError> {
    text(row, column).ok_or_else(|| StoreError::rejected("decode", format!("row is missing '{}'", column)))
}

impl Tag {
    pub fn from_row(row: &Row, name_column: &str, active_column: &str) -> Result<Self, StoreError> {
        Ok(Self {
            id: required(row, "id")?,
            name: required(row, name_column)?,
            active: flag(row, active_column),
        })
    }
}

/// Column names an assignment row is decoded with.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentColumns<'a> {
    pub entity: &'a str,
    pub tag: &'a str,
    pub active: &'a str,
    pub started: &'a str,
    pub ended: &'a str,
}

impl TagAssignment {
    pub fn from_row(row: &Row, cols: AssignmentColumns<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: required(row, "id")?,
            entity_id: required(row, cols.entity)?,
            tag_id: required(row, cols.tag)?,
            active: flag(row, cols.active),
            tenure: Tenure {
                started_at: stamp(row, cols.started).unwrap_or(0),
                ended_at: stamp(row, cols.ended),
            },
        })
    }
}

/// Builds a row from `(column, value)` pairs.
pub fn row<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignment_decodes_open_tenure() {
        let r = row([
            ("id", json!("a1")),
            ("entity_id", json!("e1")),
            ("tag_id", json!("t1")),
            ("active", json!(true)),
            ("started_at", json!(100)),
            ("ended_at", Value::Null),
        ]);
        let cols = AssignmentColumns {
            entity: "entity_id",
            tag: "tag_id",
            active: "active",
            started: "started_at",
            ended: "ended_at",
        };
        let a = TagAssignment::from_row(&r, cols).unwrap();
        assert!(a.active);
        assert_eq!(a.tenure, Tenure { started_at: 100, ended_at: None });
    }

    #[test]
    fn tag_without_name_is_rejected() {
        let r = row([("id", json!("t1"))]);
        assert!(Tag::from_row(&r, "name", "active").is_err());
    }
}
