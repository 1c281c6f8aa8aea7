use std::collections::HashSet;
use std::hash::Hash;

/// Ordered set of selected records, unique by identity key.
#[derive(Debug, Clone)]
pub struct Selection<T, K> {
    items: Vec<T>,
    keys: HashSet<K>,
}

impl<T, K> Default for Selection<T, K> {
    fn default() -> Self {
        Self { items: Vec::new(), keys: HashSet::new() }
    }
}

impl<T: Clone, K: Eq + Hash + Clone> Selection<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<T>, identity: &dyn Fn(&T) -> K) -> Self {
        let mut s = Self::new();
        for item in items {
            s.insert(identity(&item), item);
        }
        s
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    /// Appends `item` unless its key is already present.
    pub fn insert(&mut self, key: K, item: T) -> bool {
        if self.keys.insert(key) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, key: &K, identity: &dyn Fn(&T) -> K) -> bool {
        if self.keys.remove(key) {
            self.items.retain(|t| identity(t) != *key);
            true
        } else {
            false
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }
}

/// Tri-state of the "select all on this page" checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheckbox {
    Unchecked,
    Indeterminate,
    Checked,
}

impl HeaderCheckbox {
    pub fn from_counts(selected_on_page: usize, page_rows: usize) -> Self {
        if page_rows == 0 || selected_on_page == 0 {
            HeaderCheckbox::Unchecked
        } else if selected_on_page == page_rows {
            HeaderCheckbox::Checked
        } else {
            HeaderCheckbox::Indeterminate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_unique_by_key_and_keeps_order() {
        let id = |s: &(u32, &'static str)| s.0;
        let mut sel = Selection::new();
        assert!(sel.insert(2, (2, "b")));
        assert!(sel.insert(1, (1, "a")));
        assert!(!sel.insert(2, (2, "b again")));
        assert_eq!(sel.items(), &[(2, "b"), (1, "a")]);

        assert!(sel.remove(&2, &id));
        assert!(!sel.remove(&2, &id));
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn header_states() {
        assert_eq!(HeaderCheckbox::from_counts(0, 0), HeaderCheckbox::Unchecked);
        assert_eq!(HeaderCheckbox::from_counts(0, 3), HeaderCheckbox::Unchecked);
        assert_eq!(HeaderCheckbox::from_counts(2, 3), HeaderCheckbox::Indeterminate);
        assert_eq!(HeaderCheckbox::from_counts(3, 3), HeaderCheckbox::Checked);
    }
}
