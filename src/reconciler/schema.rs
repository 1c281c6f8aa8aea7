use serde::{Deserialize, Serialize};

use crate::model::AssignmentColumns;

/// Where tags and their assignments live in the record store.
///
/// One schema per entity kind: people, companies and suppliers all use the
/// same shape against different tables.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TagSchema {
    pub tags_table: String,
    pub assignments_table: String,
    pub entities_table: String,

    pub name_column: String,
    pub active_column: String,
    pub entity_column: String,
    pub tag_column: String,
    pub started_column: String,
    pub ended_column: String,
    pub updated_column: String,

    /// Fast-path procedures; `None` when the backend has no such procedure.
    pub upsert_procedure: Option<String>,
    pub deactivate_procedure: Option<String>,
    pub listing_procedure: Option<String>,
}

impl Default for TagSchema {
    fn default() -> Self {
        Self {
            tags_table: "tags".into(),
            assignments_table: "entity_tags".into(),
            entities_table: "entities".into(),
            name_column: "name".into(),
            active_column: "active".into(),
            entity_column: "entity_id".into(),
            tag_column: "tag_id".into(),
            started_column: "started_at".into(),
            ended_column: "ended_at".into(),
            updated_column: "updated_at".into(),
            upsert_procedure: Some("upsert_entity_tag".into()),
            deactivate_procedure: Some("deactivate_entity_tag".into()),
            listing_procedure: Some("entities_with_tags".into()),
        }
    }
}

impl TagSchema {
    /// Same tables, no convenience procedures.
    pub fn without_procedures(mut self) -> Self {
        self.upsert_procedure = None;
        self.deactivate_procedure = None;
        self.listing_procedure = None;
        self
    }

    pub fn assignment_columns(&self) -> AssignmentColumns<'_> {
        AssignmentColumns {
            entity: &self.entity_column,
            tag: &self.tag_column,
            active: &self.active_column,
            started: &self.started_column,
            ended: &self.ended_column,
        }
    }
}
