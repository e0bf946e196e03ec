//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep boundary layers decoupled from storage details.

pub mod presence;
pub mod query;

pub use presence::{PresenceTracker, StopOutcome, DEFAULT_BUSY_RETRIES};
pub use query::QueryFacade;
