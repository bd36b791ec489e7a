//! Fixed-size paging over the coverage grid.

use tracing::warn;

use crate::error::CoverageError;

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Number of pages needed to show `len` items, `page_size` at a time.
pub fn total_pages(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

/// The `page_index`-th page of `items`, clipped to the slice bounds.
pub fn page<T>(items: &[T], page_index: usize, page_size: usize) -> &[T] {
    let Some(start) = page_index.checked_mul(page_size) else {
        return &[];
    };
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

/// Tracks which page is on screen and translates clicks on it into grid
/// indices. Navigation past either end stays where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    len: usize,
    current: usize,
}

impl Pager {
    pub fn new(len: usize, page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            len,
            current: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        total_pages(self.len, self.page_size)
    }

    fn last_page(&self) -> usize {
        self.total().saturating_sub(1)
    }

    pub fn next(&mut self) -> usize {
        self.go_to(self.current.saturating_add(1))
    }

    pub fn prev(&mut self) -> usize {
        self.go_to(self.current.saturating_sub(1))
    }

    /// Moves to `page_index`, clamped to the existing pages.
    pub fn go_to(&mut self, page_index: usize) -> usize {
        let clamped = page_index.min(self.last_page());
        if clamped != page_index {
            warn!(
                requested = page_index,
                clamped,
                total = self.total(),
                "page out of range; clamped"
            );
        }
        self.current = clamped;
        self.current
    }

    /// Shows the page containing the grid index `absolute`.
    pub fn reveal(&mut self, absolute: usize) -> usize {
        self.go_to(absolute / self.page_size)
    }

    /// The current page of `items`.
    pub fn view<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        page(items, self.current, self.page_size)
    }

    /// Grid index for a position on the current page.
    pub fn absolute_index(&self, in_page: usize) -> Result<usize, CoverageError> {
        let start = self.current * self.page_size;
        let visible = self.len.saturating_sub(start).min(self.page_size);
        if in_page >= visible {
            return Err(CoverageError::SlotOutOfRange {
                index: start.saturating_add(in_page),
                len: self.len,
            });
        }
        Ok(start + in_page)
    }
}
