use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One page of a query result plus the size of the whole match set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Rows matching the query, ignoring pagination.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    /// `ceil(total / limit)`, zero when nothing matched.
    pub total_pages: u64,
}

impl<T> PageResult<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        }
    }

    /// Reshape every item, keeping the pagination metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }

    #[must_use]
    pub fn is_last_page(&self) -> bool {
        u64::from(self.page) >= self.total_pages
    }
}

fn total_pages(total: u64, limit: u32) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(u64::from(limit))
}
