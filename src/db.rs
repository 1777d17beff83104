//! Database module for storage and search.
//!
//! Uses sled for the append-only record store and tantivy for full-text search.

pub use crate::search::SearchIndex;
pub use crate::storage::InsightStore;
