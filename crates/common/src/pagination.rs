//! Limit/offset pagination.

use serde::{Deserialize, Serialize};

/// Page size used when the client does not ask for one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 100;

/// Requested window into a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Effective page size, defaulted and capped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Cuts the requested window out of an already-filtered, ordered list.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let count = items.len() as u64;
        let results = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit() as usize)
            .collect();
        Page {
            count,
            limit: self.limit(),
            offset: self.offset(),
            results,
        }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub limit: u32,
    pub offset: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Converts every result, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            limit: self.limit,
            offset: self.offset,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
