//! Paginated message and chat lists as returned by the chat service.
//!
//! The service returns messages newest-first. Conversation views want the
//! opposite, so pages are reversed once, before decryption.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total items across all pages
    pub total: u64,
    /// 1-based page index
    pub page: u32,
    /// Items per page
    pub page_size: u32,
}

/// One page of results, `{ data, meta }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub data: Vec<T>,
    /// Pagination metadata
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Reverse a newest-first page into oldest-first order
    pub fn into_chronological(mut self) -> Self {
        self.data.reverse();
        self
    }

    /// Apply a fallible transform to every item, keeping order and metadata
    ///
    /// Stops at the first error.
    pub fn try_map<U, F>(self, f: F) -> Result<Page<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        let data = self.data.into_iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Page {
            data,
            meta: self.meta,
        })
    }

    /// Number of items on this page
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether this page has no items
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
