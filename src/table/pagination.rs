use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Requested sizes at or above this count mean "show all".
pub const ALL_SENTINEL: usize = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Rows(usize),
    All,
}

pub const PAGE_SIZE_OPTIONS: [PageSize; 8] = [
    PageSize::Rows(10),
    PageSize::Rows(25),
    PageSize::Rows(50),
    PageSize::Rows(100),
    PageSize::Rows(250),
    PageSize::Rows(500),
    PageSize::Rows(1000),
    PageSize::All,
];

impl PageSize {
    pub fn from_count(n: usize) -> Self {
        if n >= ALL_SENTINEL {
            PageSize::All
        } else {
            PageSize::Rows(n.max(1))
        }
    }

    fn normalized(self) -> Self {
        match self {
            PageSize::Rows(n) => PageSize::from_count(n),
            PageSize::All => PageSize::All,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Rows(25)
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PageSize::All);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("page size must be at least 1".to_string()),
            Ok(n) => Ok(PageSize::from_count(n)),
            Err(_) => Err(format!("invalid page size '{}'", s)),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Rows(n) => write!(f, "{}", n),
            PageSize::All => write!(f, "all"),
        }
    }
}

/// Derived numbers for a footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: usize,
    pub page_size: PageSize,
    pub total: usize,
    pub total_pages: usize,
    /// 1-based, 0 when there is nothing to show
    pub start_item: usize,
    pub end_item: usize,
    pub showing_all: bool,
}

/// Page cursor. `page` is 1-based and kept within `[1, total_pages]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    size: PageSize,
}

impl Pagination {
    pub fn new(size: PageSize) -> Self {
        Self { page: 1, size: size.normalized() }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    /// Never less than 1, so an empty collection still has a page to be on.
    pub fn total_pages(&self, total: usize) -> usize {
        match self.size {
            PageSize::All => 1,
            PageSize::Rows(n) => total.div_ceil(n).max(1),
        }
    }

    pub fn set_page(&mut self, page: usize, total: usize) {
        self.page = page.clamp(1, self.total_pages(total));
    }

    /// Changing the size always returns to the first page.
    pub fn set_size(&mut self, size: PageSize) {
        self.size = size.normalized();
        self.page = 1;
    }

    /// Re-clamps after the collection changed size.
    pub fn clamp(&mut self, total: usize) {
        self.set_page(self.page, total);
    }

    /// Absolute index of the first row on the current page.
    pub fn offset(&self) -> usize {
        match self.size {
            PageSize::All => 0,
            PageSize::Rows(n) => (self.page - 1).saturating_mul(n),
        }
    }

    /// Absolute indexes of the current page's rows.
    pub fn window(&self, total: usize) -> Range<usize> {
        match self.size {
            PageSize::All => 0..total,
            PageSize::Rows(n) => {
                let start = self.offset().min(total);
                start..start.saturating_add(n).min(total)
            }
        }
    }

    pub fn info(&self, total: usize) -> PageInfo {
        let window = self.window(total);
        PageInfo {
            page: self.page,
            page_size: self.size,
            total,
            total_pages: self.total_pages(total),
            start_item: if window.is_empty() { 0 } else { window.start + 1 },
            end_item: window.end,
            showing_all: self.size == PageSize::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_page_range() {
        let mut p = Pagination::new(PageSize::Rows(25));
        assert_eq!(p.total_pages(60), 3);

        p.set_page(5, 60);
        assert_eq!(p.page(), 3);
        assert_eq!(p.window(60), 50..60);

        p.set_page(0, 60);
        assert_eq!(p.page(), 1);
    }

    #[test]
    fn show_all_is_one_page_of_everything() {
        for total in [0, 1, 60, 2_000_000] {
            let mut p = Pagination::new(PageSize::All);
            p.set_page(7, total);
            assert_eq!(p.total_pages(total), 1);
            assert_eq!(p.window(total), 0..total);
        }
    }

    #[test]
    fn sentinel_sizes_become_all() {
        assert_eq!(PageSize::from_count(999_999), PageSize::All);
        assert_eq!(PageSize::from_count(usize::MAX), PageSize::All);
        assert_eq!("ALL".parse::<PageSize>().unwrap(), PageSize::All);
        assert_eq!("50".parse::<PageSize>().unwrap(), PageSize::Rows(50));
        assert!("0".parse::<PageSize>().is_err());
    }

    #[test]
    fn size_change_resets_page() {
        let mut p = Pagination::new(PageSize::Rows(10));
        p.set_page(4, 100);
        p.set_size(PageSize::Rows(50));
        assert_eq!(p.page(), 1);
    }

    #[test]
    fn info_for_last_partial_page() {
        let mut p = Pagination::new(PageSize::Rows(25));
        p.set_page(3, 60);
        let info = p.info(60);
        assert_eq!((info.start_item, info.end_item), (51, 60));
        assert!(!info.showing_all);

        let empty = Pagination::new(PageSize::Rows(25)).info(0);
        assert_eq!((empty.start_item, empty.end_item, empty.total_pages), (0, 0, 1));
    }
}
