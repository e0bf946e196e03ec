//! Search entry points.
//!
//! # Responsibility
//! - Expose one scoped keyword search across anchors and items.
//! - Keep result shaping inside core.
//!
//! # Invariants
//! - Results only contain rows visible to the caller.
//! - Zero matches is an empty list, never an error.

pub mod substring;

pub use substring::{search_all, SearchHit, SearchQuery, DEFAULT_SEARCH_LIMIT, SNIPPET_MAX_CHARS};
