//! Page cursor for "load more" lists

/// Cursor state for a paginated list.
///
/// The page only advances after a successful fetch, and a second
/// `begin_load` while one is outstanding is refused. The generation moves
/// whenever the query behind the list changes, so a fetch that started
/// under the old query can tell its page is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// Next page to request (1-based)
    next_page: u32,
    /// Whether the server reported more items
    has_more: bool,
    /// A fetch is outstanding
    loading: bool,
    generation: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            next_page: 1,
            has_more: true,
            loading: false,
            generation: 0,
        }
    }
}

impl Pagination {
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Claim the next fetch. Returns the page to request, or `None` when a
    /// fetch is already outstanding or the list is exhausted.
    pub fn begin_load(&mut self) -> Option<u32> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(self.next_page)
    }

    /// Claim a first-page refetch. Unlike [`begin_load`](Self::begin_load)
    /// this ignores `has_more`; the cursor is only reset once the fresh page
    /// has arrived.
    pub fn begin_reload(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    /// Record a successful fetch
    pub fn finish_load(&mut self, has_more: bool) {
        self.loading = false;
        self.has_more = has_more;
        self.next_page += 1;
    }

    /// Record a failed fetch; the cursor stays where it was
    pub fn abort_load(&mut self) {
        self.loading = false;
    }

    /// Disown the outstanding fetch. Its result belongs to an older
    /// generation and the next load may start immediately.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.loading = false;
    }

    /// Back to page one (refresh); the generation carries over
    pub fn reset(&mut self) {
        *self = Self {
            generation: self.generation,
            ..Self::default()
        };
    }
}
