use std::fmt::Write;
use std::hash::Hash;

use super::{HeaderCheckbox, SelectableTable, SortDirection};

fn checkbox(state: HeaderCheckbox) -> &'static str {
    match state {
        HeaderCheckbox::Checked => "[x]",
        HeaderCheckbox::Indeterminate => "[-]",
        HeaderCheckbox::Unchecked => "[ ]",
    }
}

impl<T: Clone, K: Eq + Hash + Clone> SelectableTable<T, K> {
    /// Plain-text grid of the current page with a footer.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return format!("{}\n", self.empty_message);
        }

        let columns: Vec<_> = self.visible_columns().collect();
        let window = self.window();

        let mut header: Vec<String> = Vec::with_capacity(columns.len() + 2);
        if self.selectable {
            header.push(checkbox(self.header_checkbox()).to_string());
        }
        header.push("#".to_string());
        for c in &columns {
            let marker = match (&self.sort.key, self.sort.direction) {
                (Some(k), SortDirection::Asc) if *k == c.key => " ^",
                (Some(k), SortDirection::Desc) if *k == c.key => " v",
                _ => "",
            };
            header.push(format!("{}{}", c.header, marker));
        }

        let mut body: Vec<Vec<String>> = Vec::with_capacity(window.len());
        for index in window {
            let Some(record) = self.record_at(index) else { continue };
            let mut cells = Vec::with_capacity(header.len());
            if self.selectable {
                let state = if self.is_selected(record) { HeaderCheckbox::Checked } else { HeaderCheckbox::Unchecked };
                cells.push(checkbox(state).to_string());
            }
            cells.push((index + 1).to_string());
            cells.extend(columns.iter().map(|c| c.render(record)));
            body.push(cells);
        }

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for cells in &body {
            for (w, cell) in widths.iter_mut().zip(cells) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_line(&mut out, &rule, &widths);
        for cells in &body {
            push_line(&mut out, cells, &widths);
        }
        out.push_str(&self.footer());
        out.push('\n');
        out
    }

    pub fn footer(&self) -> String {
        let info = self.page_info();
        let mut line = if info.showing_all {
            format!("Showing all {} items", info.total)
        } else {
            format!(
                "{}-{} of {} | Page {} of {}",
                info.start_item, info.end_item, info.total, info.page, info.total_pages
            )
        };
        if self.selectable && !self.selection.is_empty() {
            let _ = write!(line, " | {} selected", self.selection.len());
        }
        line
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::{Column, PageSize, SortValue, TableOptions};
    use super::*;
    use crate::storage::MemoryKv;

    fn table() -> SelectableTable<(u32, &'static str), u32> {
        let columns = vec![Column::new("name", "Name", |r: &(u32, &'static str)| SortValue::from(r.1)).sortable()];
        let options = TableOptions { default_page_size: PageSize::Rows(2), ..TableOptions::default() };
        SelectableTable::new(columns, |r: &(u32, &'static str)| r.0, Arc::new(MemoryKv::new()), options)
    }

    #[test]
    fn empty_table_shows_message_only() {
        let t = table();
        assert_eq!(t.render(), "No records found.\n");
    }

    #[test]
    fn renders_page_with_markers() {
        let mut t = table();
        t.set_records(vec![(1, "b"), (2, "a"), (3, "c")]);
        t.click_header("name");
        t.toggle_row(0, false);

        let out = t.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "[-]  #  Name ^");
        assert_eq!(lines[2], "[x]  1  a");
        assert_eq!(lines[3], "[ ]  2  b");
        assert_eq!(lines[4], "1-2 of 3 | Page 1 of 2 | 1 selected");
    }
}
