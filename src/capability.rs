//! One add/remove-tag surface shared by every entity kind.

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::model::Tag;
use crate::reconciler::{BulkReport, RoleReconciler, TagChange, TagOp, TagOutcome};
use crate::store::RecordStore;
use crate::table::SelectableTable;

/// What a bulk tag editor needs from an entity kind.
#[allow(async_fn_in_trait)]
pub trait TagCapability {
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;
    async fn add_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError>;
    async fn remove_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError>;
}

impl<S: RecordStore> TagCapability for RoleReconciler<S> {
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.available_tags().await
    }

    async fn add_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError> {
        RoleReconciler::add_tag(self, entity_id, tag).await
    }

    async fn remove_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError> {
        RoleReconciler::remove_tag(self, entity_id, tag).await
    }
}

/// Applies `add` then `remove` to each entity in order, one call per
/// (entity, tag) pair. Failures are recorded, never fatal.
pub async fn fan_out<C: TagCapability>(cap: &C, entity_ids: &[String], add: &[String], remove: &[String]) -> BulkReport {
    let mut report = BulkReport::default();
    for id in entity_ids {
        for tag in add {
            let result = cap.add_tag(id, tag).await;
            report.outcomes.push(TagOutcome::record(id, tag, TagOp::Add, result));
        }
        for tag in remove {
            let result = cap.remove_tag(id, tag).await;
            report.outcomes.push(TagOutcome::record(id, tag, TagOp::Remove, result));
        }
    }
    tracing::info!(entities = entity_ids.len(), "{}", report.summary());
    report
}

/// Staged tag edits for a selection of entities.
///
/// Staging a tag for addition unstages it from removal and vice versa, so a
/// tag is never both added and removed by one `apply`.
pub struct BulkTagEditor<'a, C> {
    capability: &'a C,
    to_add: BTreeSet<String>,
    to_remove: BTreeSet<String>,
}

impl<'a, C: TagCapability> BulkTagEditor<'a, C> {
    pub fn new(capability: &'a C) -> Self {
        Self { capability, to_add: BTreeSet::new(), to_remove: BTreeSet::new() }
    }

    /// Tags the user can pick from.
    pub async fn choices(&self) -> Result<Vec<Tag>, StoreError> {
        self.capability.list_tags().await
    }

    pub fn stage_add(&mut self, tag: &str) {
        self.to_remove.remove(tag);
        self.to_add.insert(tag.to_string());
    }

    pub fn stage_remove(&mut self, tag: &str) {
        self.to_add.remove(tag);
        self.to_remove.insert(tag.to_string());
    }

    pub fn unstage(&mut self, tag: &str) {
        self.to_add.remove(tag);
        self.to_remove.remove(tag);
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Runs the staged edits against `entity_ids` and clears the stage.
    pub async fn apply(&mut self, entity_ids: &[String]) -> BulkReport {
        let add: Vec<String> = std::mem::take(&mut self.to_add).into_iter().collect();
        let remove: Vec<String> = std::mem::take(&mut self.to_remove).into_iter().collect();
        fan_out(self.capability, entity_ids, &add, &remove).await
    }

    /// Applies the staged edits to the table's selected rows, then clears
    /// the selection: the selected records are stale once their tags change.
    pub async fn apply_to_selection<T: Clone>(&mut self, table: &mut SelectableTable<T, String>) -> BulkReport {
        let ids = table.selected_keys();
        let report = self.apply(&ids).await;
        table.clear_selection();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use crate::table::{Column, SortValue, TableOptions};
    use std::cell::RefCell;
    use std::sync::Arc;

    /// Capability that records calls and fails for one entity.
    #[derive(Default)]
    struct Recording {
        calls: RefCell<Vec<(String, String, TagOp)>>,
    }

    impl TagCapability for Recording {
        async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
            Ok(vec![Tag { id: "t1".into(), name: "cliente".into(), active: true }])
        }

        async fn add_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError> {
            self.calls.borrow_mut().push((entity_id.into(), tag.into(), TagOp::Add));
            if entity_id == "bad" {
                return Err(StoreError::Transient("offline".into()));
            }
            Ok(TagChange::Inserted)
        }

        async fn remove_tag(&self, entity_id: &str, tag: &str) -> Result<TagChange, StoreError> {
            self.calls.borrow_mut().push((entity_id.into(), tag.into(), TagOp::Remove));
            Ok(TagChange::Deactivated)
        }
    }

    #[tokio::test]
    async fn staging_is_exclusive_and_applies_per_pair() {
        let cap = Recording::default();
        let mut editor = BulkTagEditor::new(&cap);
        editor.stage_remove("cliente");
        editor.stage_add("cliente");
        editor.stage_remove("old");
        assert_eq!(editor.choices().await.unwrap().len(), 1);

        let ids = vec!["e1".to_string(), "bad".to_string(), "e2".to_string()];
        let report = editor.apply(&ids).await;

        assert!(editor.is_empty());
        assert_eq!(report.outcomes.len(), 6);
        assert_eq!(report.failed(), 1);
        assert_eq!(cap.calls.borrow()[0], ("e1".into(), "cliente".into(), TagOp::Add));
        assert_eq!(cap.calls.borrow()[1], ("e1".into(), "old".into(), TagOp::Remove));
        // failure on "bad" did not stop "e2"
        assert_eq!(cap.calls.borrow()[5], ("e2".into(), "old".into(), TagOp::Remove));
    }

    #[tokio::test]
    async fn applying_to_a_selection_clears_it() {
        let cap = Recording::default();
        let cols = vec![Column::new("id", "ID", |id: &String| SortValue::from(id.as_str()))];
        let mut table = SelectableTable::new(cols, |id: &String| id.clone(), Arc::new(MemoryKv::new()), TableOptions::default());
        table.set_records(vec!["e1".to_string(), "e2".to_string(), "e3".to_string()]);
        table.toggle_index(0, false);
        table.toggle_index(2, false);

        let mut editor = BulkTagEditor::new(&cap);
        editor.stage_add("vip");
        let report = editor.apply_to_selection(&mut table).await;

        assert_eq!(report.succeeded(), 2);
        let touched: Vec<String> = cap.calls.borrow().iter().map(|c| c.0.clone()).collect();
        assert_eq!(touched, ["e1", "e3"]);
        assert!(table.selected().is_empty());
        assert_eq!(table.anchor(), None);
    }
}
