//! Ownership scoping.
//!
//! # Responsibility
//! - Decide whether a resource lies in a caller's ownership closure.
//! - Produce composable SQL predicates so list queries filter at the store
//!   boundary instead of post-filtering rows in memory.
//! - Validate zone/anchor references named by writes before they are applied.
//!
//! # Invariants
//! - Zone is the only ownership root; every other kind resolves through one
//!   fixed join path per [`ResourceKind`].
//! - Denials are indistinguishable from absence (`NotFound`).
//! - Decisions are never cached across calls.

mod policy;
mod resolver;

pub use policy::UnscopedPolicy;
pub use resolver::{Access, ResourceKind, ResourceRef, ScopeFilter, ScopeResolver, WriteRefs};
