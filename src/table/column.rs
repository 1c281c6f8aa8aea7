use std::collections::BTreeMap;
use std::sync::Arc;

use crate::storage::KeyValueStore;
use super::sort::SortValue;

type Accessor<T> = Box<dyn Fn(&T) -> SortValue>;
type Renderer<T> = Box<dyn Fn(&T) -> String>;

/// One column: how to read a comparable value from a record and, if the
/// plain value is not what should be shown, how to render the cell.
pub struct Column<T> {
    pub key: String,
    pub header: String,
    pub sortable: bool,
    value: Accessor<T>,
    cell: Option<Renderer<T>>,
}

impl<T> Column<T> {
    pub fn new(key: &str, header: &str, value: impl Fn(&T) -> SortValue + 'static) -> Self {
        Self {
            key: key.to_string(),
            header: header.to_string(),
            sortable: false,
            value: Box::new(value),
            cell: None,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn with_cell(mut self, render: impl Fn(&T) -> String + 'static) -> Self {
        self.cell = Some(Box::new(render));
        self
    }

    pub fn value(&self, record: &T) -> SortValue {
        (self.value)(record)
    }

    pub fn render(&self, record: &T) -> String {
        match &self.cell {
            Some(render) => render(record),
            None => self.value(record).to_string(),
        }
    }
}

/// Per-column visibility, persisted as a JSON object under one storage key.
///
/// Columns missing from the stored map are visible.
pub struct ColumnVisibility {
    storage_key: String,
    visible: BTreeMap<String, bool>,
    store: Arc<dyn KeyValueStore>,
}

impl ColumnVisibility {
    pub fn load<'a>(store: Arc<dyn KeyValueStore>, storage_key: &str, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut visible: BTreeMap<String, bool> = keys.into_iter().map(|k| (k.to_string(), true)).collect();

        match store.get_item(storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeMap<String, bool>>(&raw) {
                Ok(saved) => visible.extend(saved),
                Err(e) => tracing::warn!(key = storage_key, error = %e, "ignoring unreadable column preferences"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key = storage_key, error = %e, "could not read column preferences"),
        }

        Self { storage_key: storage_key.to_string(), visible, store }
    }

    pub fn is_visible(&self, key: &str) -> bool {
        self.visible.get(key).copied().unwrap_or(true)
    }

    /// Updates one column and writes the whole map back immediately. A
    /// failed write is logged; the in-memory state still changes.
    pub fn set(&mut self, key: &str, visible: bool) {
        self.visible.insert(key.to_string(), visible);
        let persisted = serde_json::to_string(&self.visible)
            .map_err(crate::error::StorageError::from)
            .and_then(|raw| self.store.set_item(&self.storage_key, &raw));
        if let Err(e) = persisted {
            tracing::warn!(key = %self.storage_key, error = %e, "could not persist column preferences");
        }
    }

    pub fn as_map(&self) -> &BTreeMap<String, bool> {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    #[test]
    fn defaults_to_visible_and_merges_saved_map() {
        let kv = Arc::new(MemoryKv::new());
        kv.set_item("cols", r#"{"email":false}"#).unwrap();

        let vis = ColumnVisibility::load(kv, "cols", ["name", "email", "phone"]);
        assert!(vis.is_visible("name"));
        assert!(!vis.is_visible("email"));
        assert!(vis.is_visible("never-seen"));
    }

    #[test]
    fn corrupt_preferences_fall_back_to_all_visible() {
        let kv = Arc::new(MemoryKv::new());
        kv.set_item("cols", "not json").unwrap();
        let vis = ColumnVisibility::load(kv, "cols", ["name"]);
        assert!(vis.is_visible("name"));
    }

    #[test]
    fn set_persists_full_map() {
        let kv = Arc::new(MemoryKv::new());
        let mut vis = ColumnVisibility::load(kv.clone(), "cols", ["name", "email"]);
        vis.set("email", false);

        let raw = kv.get_item("cols").unwrap().unwrap();
        let saved: BTreeMap<String, bool> = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.get("name"), Some(&true));
        assert_eq!(saved.get("email"), Some(&false));
    }
}
