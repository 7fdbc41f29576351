//! Pagination for ledger queries.

use serde::{Deserialize, Serialize};

use stockroom_inventory::MovementEntry;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }

    /// Cap `limit` at `max` (and at least 1).
    pub fn clamped(self, max: u32) -> Self {
        Self {
            limit: self.limit.clamp(1, max.max(1)),
            offset: self.offset,
        }
    }

    pub fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

/// One page of ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    /// Entries on this page, newest first.
    pub entries: Vec<MovementEntry>,
    /// Number of entries matching the filter across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn from_matches(total: u64, entries: Vec<MovementEntry>, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            entries,
            total,
            pagination,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_requested_limit() {
        assert_eq!(Pagination::new(Some(5_000), None).limit, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(None, Some(10)), Pagination { limit: 50, offset: 10 });
        assert_eq!(Pagination { limit: 0, offset: 0 }.clamped(100).limit, 1);
    }

    #[test]
    fn has_more_accounts_for_offset() {
        let page = MovementPage::from_matches(12, vec![], Pagination { limit: 5, offset: 5 });
        assert!(page.has_more);
        let page = MovementPage::from_matches(10, vec![], Pagination { limit: 5, offset: 5 });
        assert!(!page.has_more);
    }
}
