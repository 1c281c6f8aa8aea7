//! Paginated, sortable, multi-selectable view over an in-memory collection.
//!
//! The table knows nothing about where records come from or what a bulk action
//! does with the selection. Records are held in caller order; `order` holds the
//! sorted permutation, and every "absolute index" below is a position in it.

pub mod column;
pub mod pagination;
pub mod render;
pub mod selection;
pub mod sort;

use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::storage::KeyValueStore;

pub use column::{Column, ColumnVisibility};
pub use pagination::{PageInfo, PageSize, Pagination, ALL_SENTINEL, PAGE_SIZE_OPTIONS};
pub use selection::{HeaderCheckbox, Selection};
pub use sort::{SortDirection, SortMode, SortRequest, SortState, SortValue};

pub const DEFAULT_STORAGE_KEY: &str = "selectable-table.columns";

#[derive(Debug, Clone)]
pub struct TableOptions {
    pub selectable: bool,
    pub pagination: bool,
    pub default_page_size: PageSize,
    pub empty_message: String,
    /// Key the column visibility map is stored under.
    pub storage_key: String,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            selectable: true,
            pagination: true,
            default_page_size: PageSize::default(),
            empty_message: "No records found.".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl TableOptions {
    /// Storage key scoped to one table instance, e.g. `people:main`.
    pub fn scoped(mut self, namespace: &str, table_id: &str) -> Self {
        self.storage_key = format!("{}:{}:{}", DEFAULT_STORAGE_KEY, namespace, table_id);
        self
    }
}

type Identity<T, K> = Box<dyn Fn(&T) -> K>;
type SelectionListener<T> = Box<dyn FnMut(&[T])>;

pub struct SelectableTable<T, K> {
    records: Vec<T>,
    order: Vec<usize>,
    columns: Vec<Column<T>>,
    visibility: ColumnVisibility,
    identity: Identity<T, K>,
    sort: SortState,
    sort_mode: SortMode,
    pagination: Pagination,
    paginate: bool,
    selectable: bool,
    selection: Selection<T, K>,
    anchor: Option<usize>,
    empty_message: String,
    lifecycle: CancellationToken,
    on_selection_change: Option<SelectionListener<T>>,
}

impl<T: Clone, K: Eq + Hash + Clone> SelectableTable<T, K> {
    pub fn new(
        columns: Vec<Column<T>>,
        identity: impl Fn(&T) -> K + 'static,
        store: Arc<dyn KeyValueStore>,
        options: TableOptions,
    ) -> Self {
        let visibility = ColumnVisibility::load(store, &options.storage_key, columns.iter().map(|c| c.key.as_str()));
        let size = if options.pagination { options.default_page_size } else { PageSize::All };

        Self {
            records: Vec::new(),
            order: Vec::new(),
            columns,
            visibility,
            identity: Box::new(identity),
            sort: SortState::default(),
            sort_mode: SortMode::Internal,
            pagination: Pagination::new(size),
            paginate: options.pagination,
            selectable: options.selectable,
            selection: Selection::new(),
            anchor: None,
            empty_message: options.empty_message,
            lifecycle: CancellationToken::new(),
            on_selection_change: None,
        }
    }

    /// The caller sorts; header clicks only report what was asked for.
    pub fn with_external_sort(mut self) -> Self {
        self.sort_mode = SortMode::External;
        self.resort();
        self
    }

    pub fn on_selection_change(mut self, listener: impl FnMut(&[T]) + 'static) -> Self {
        self.on_selection_change = Some(Box::new(listener));
        self
    }

    // --- RECORDS ---

    pub fn set_records(&mut self, records: Vec<T>) {
        self.records = records;
        self.resort();
        self.pagination.clamp(self.records.len());
    }

    /// Applies `records` only if the table is still mounted and `token` was
    /// not cancelled. Returns whether they were applied.
    pub fn replace_records_if_live(&mut self, token: &CancellationToken, records: Vec<T>) -> bool {
        if token.is_cancelled() || self.lifecycle.is_cancelled() {
            tracing::debug!(dropped = records.len(), "discarding records for an unmounted table");
            return false;
        }
        self.set_records(records);
        true
    }

    /// Token for one in-flight load; cancelled when the table unmounts.
    pub fn lifecycle(&self) -> CancellationToken {
        self.lifecycle.child_token()
    }

    pub fn unmount(&mut self) {
        self.lifecycle.cancel();
    }

    pub fn is_mounted(&self) -> bool {
        !self.lifecycle.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn empty_message(&self) -> &str {
        &self.empty_message
    }

    /// Record at an absolute (sorted) index.
    pub fn record_at(&self, index: usize) -> Option<&T> {
        self.order.get(index).map(|&i| &self.records[i])
    }

    /// The whole collection in display order.
    pub fn sorted(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().map(move |&i| &self.records[i])
    }

    // --- PAGINATION ---

    fn window(&self) -> Range<usize> {
        self.pagination.window(self.records.len())
    }

    pub fn visible_rows(&self) -> Vec<&T> {
        self.window().filter_map(|i| self.record_at(i)).collect()
    }

    pub fn page_info(&self) -> PageInfo {
        self.pagination.info(self.records.len())
    }

    pub fn set_page(&mut self, page: usize) {
        self.pagination.set_page(page, self.records.len());
    }

    pub fn next_page(&mut self) {
        self.set_page(self.pagination.page() + 1);
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.pagination.page().saturating_sub(1));
    }

    /// Ignored when pagination is disabled.
    pub fn set_page_size(&mut self, size: PageSize) {
        if self.paginate {
            self.pagination.set_size(size);
        }
    }

    // --- SORTING ---

    pub fn sort_state(&self) -> &SortState {
        &self.sort
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    /// Header click. Internal mode re-sorts and returns `None`; external mode
    /// leaves the order alone and returns the request for the caller.
    pub fn click_header(&mut self, key: &str) -> Option<SortRequest> {
        let sortable = self.columns.iter().any(|c| c.key == key && c.sortable);
        if !sortable {
            return None;
        }
        let direction = self.sort.next_for(key);
        match self.sort_mode {
            SortMode::External => Some(SortRequest { key: key.to_string(), direction }),
            SortMode::Internal => {
                self.sort = SortState { key: Some(key.to_string()), direction };
                self.resort();
                None
            }
        }
    }

    /// Current key and direction as reported by the caller in external mode.
    pub fn set_external_sort(&mut self, key: Option<String>, direction: SortDirection) {
        self.sort = SortState { key, direction };
    }

    fn resort(&mut self) {
        self.order = (0..self.records.len()).collect();
        self.anchor = None;

        if self.sort_mode == SortMode::External {
            return;
        }
        let Some(key) = self.sort.key.as_deref() else { return };
        let Some(column) = self.columns.iter().find(|c| c.key == key) else { return };

        let values: Vec<SortValue> = self.records.iter().map(|r| column.value(r)).collect();
        let desc = self.sort.direction == SortDirection::Desc;
        self.order.sort_by(|&a, &b| {
            let ord = values[a].compare(&values[b]);
            if desc { ord.reverse() } else { ord }
        });
    }

    // --- COLUMNS ---

    pub fn columns(&self) -> &[Column<T>] {
        &self.columns
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &Column<T>> + '_ {
        self.columns.iter().filter(move |c| self.visibility.is_visible(&c.key))
    }

    pub fn is_column_visible(&self, key: &str) -> bool {
        self.visibility.is_visible(key)
    }

    /// Returns false for an unknown column.
    pub fn set_column_visible(&mut self, key: &str, visible: bool) -> bool {
        if !self.columns.iter().any(|c| c.key == key) {
            return false;
        }
        self.visibility.set(key, visible);
        true
    }

    // --- SELECTION ---

    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    pub fn selected(&self) -> &[T] {
        self.selection.items()
    }

    pub fn is_selected(&self, record: &T) -> bool {
        self.selection.contains(&(self.identity)(record))
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    /// Checkbox click on a row of the current page.
    pub fn toggle_row(&mut self, page_row: usize, shift: bool) -> bool {
        let window = self.window();
        let index = window.start + page_row;
        if index >= window.end {
            return false;
        }
        self.toggle_index(index, shift)
    }

    /// Checkbox click by absolute index.
    ///
    /// Shift with an anchor unions every record between the anchor and
    /// `index` (inclusive) into the selection and leaves the anchor where it
    /// is. Anything else toggles the one record and moves the anchor to it.
    pub fn toggle_index(&mut self, index: usize, shift: bool) -> bool {
        if !self.selectable || index >= self.order.len() {
            return false;
        }

        match self.anchor {
            Some(anchor) if shift && anchor != index && anchor < self.order.len() => {
                let (lo, hi) = (anchor.min(index), anchor.max(index));
                for i in lo..=hi {
                    let record = &self.records[self.order[i]];
                    self.selection.insert((self.identity)(record), record.clone());
                }
                tracing::debug!(from = lo, to = hi, "range selected");
            }
            _ => {
                let record = &self.records[self.order[index]];
                let key = (self.identity)(record);
                if !self.selection.remove(&key, &*self.identity) {
                    self.selection.insert(key, record.clone());
                }
                self.anchor = Some(index);
            }
        }

        self.notify();
        true
    }

    pub fn header_checkbox(&self) -> HeaderCheckbox {
        let window = self.window();
        let page_rows = window.len();
        let selected = window
            .filter_map(|i| self.record_at(i))
            .filter(|r| self.is_selected(r))
            .count();
        HeaderCheckbox::from_counts(selected, page_rows)
    }

    /// Selects the whole current page unless it is already fully selected, in
    /// which case the page is deselected. Other pages are untouched.
    pub fn toggle_select_all(&mut self) {
        if !self.selectable {
            return;
        }
        let window = self.window();
        if window.is_empty() {
            return;
        }

        let select = self.header_checkbox() != HeaderCheckbox::Checked;
        for i in window {
            let record = &self.records[self.order[i]];
            let key = (self.identity)(record);
            if select {
                self.selection.insert(key, record.clone());
            } else {
                self.selection.remove(&key, &*self.identity);
            }
        }
        self.notify();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.anchor = None;
        self.notify();
    }

    /// Replaces the selection with caller-supplied records.
    pub fn set_selection(&mut self, records: Vec<T>) {
        self.selection = Selection::from_items(records, &*self.identity);
        self.notify();
    }

    pub fn selected_keys(&self) -> Vec<K> {
        self.selection.items().iter().map(|r| (self.identity)(r)).collect()
    }

    fn notify(&mut self) {
        if let Some(listener) = self.on_selection_change.as_mut() {
            listener(self.selection.items());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        name: &'static str,
    }

    fn table(size: usize) -> SelectableTable<Item, u32> {
        let columns = vec![
            Column::new("id", "ID", |r: &Item| SortValue::Int(r.id as i64)).sortable(),
            Column::new("name", "Name", |r: &Item| SortValue::from(r.name)).sortable(),
        ];
        let options = TableOptions { default_page_size: PageSize::Rows(size), ..TableOptions::default() };
        let mut t = SelectableTable::new(columns, |r: &Item| r.id, Arc::new(MemoryKv::new()), options);
        t.set_records(vec![
            Item { id: 1, name: "C" },
            Item { id: 2, name: "A" },
            Item { id: 3, name: "B" },
        ]);
        t
    }

    #[test]
    fn header_click_cycles_direction() {
        let mut t = table(10);
        assert_eq!(t.click_header("name"), None);
        let names: Vec<_> = t.sorted().map(|r| r.name).collect();
        assert_eq!(names, ["A", "B", "C"]);

        t.click_header("name");
        let names: Vec<_> = t.sorted().map(|r| r.name).collect();
        assert_eq!(names, ["C", "B", "A"]);

        t.click_header("id");
        assert_eq!(t.sort_state().direction, SortDirection::Asc);
        assert_eq!(t.record_at(0).map(|r| r.id), Some(1));
    }

    #[test]
    fn plain_click_toggles_and_moves_anchor() {
        let mut t = table(10);
        assert!(t.toggle_row(1, false));
        assert_eq!(t.anchor(), Some(1));
        assert_eq!(t.selected_keys(), vec![2]);

        assert!(t.toggle_row(1, false));
        assert!(t.selected().is_empty());
        assert!(!t.toggle_row(9, false));
    }

    #[test]
    fn shift_without_anchor_is_a_plain_click() {
        let mut t = table(10);
        t.toggle_index(2, true);
        assert_eq!(t.selected_keys(), vec![3]);
        assert_eq!(t.anchor(), Some(2));
    }

    #[test]
    fn unsortable_header_is_ignored() {
        let columns = vec![Column::new("name", "Name", |r: &Item| SortValue::from(r.name))];
        let mut t: SelectableTable<Item, u32> =
            SelectableTable::new(columns, |r| r.id, Arc::new(MemoryKv::new()), TableOptions::default());
        assert_eq!(t.click_header("name"), None);
        assert_eq!(t.sort_state().key, None);
    }

    #[test]
    fn disabled_pagination_shows_everything() {
        let options = TableOptions { pagination: false, default_page_size: PageSize::Rows(1), ..TableOptions::default() };
        let columns = vec![Column::new("id", "ID", |r: &Item| SortValue::Int(r.id as i64))];
        let mut t = SelectableTable::new(columns, |r: &Item| r.id, Arc::new(MemoryKv::new()), options);
        t.set_records(vec![Item { id: 1, name: "a" }, Item { id: 2, name: "b" }]);
        t.set_page_size(PageSize::Rows(1));
        assert_eq!(t.visible_rows().len(), 2);
    }

    #[test]
    fn scoped_storage_key() {
        let opts = TableOptions::default().scoped("people", "main");
        assert_eq!(opts.storage_key, "selectable-table.columns:people:main");
    }
}
