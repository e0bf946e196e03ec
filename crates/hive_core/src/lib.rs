//! Core domain logic for Hive.
//! This crate is the single source of truth for ownership scoping and
//! presence invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scope;
pub mod search;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::{
    Anchor, AnchorId, AnchorPatch, Breadcrumb, BreadcrumbId, CallerId, Capture, CaptureId,
    CaptureSource, DeviceType, Item, ItemId, ItemPatch, ItemStatus, ItemType, NewAnchor,
    NewCapture, NewItem, NewRouteSet, NewScan, NewZone, Patch, PresenceState, RouteSet,
    RouteSetId, RouteSetPatch, ScanLog, ValidationError, Zone, ZoneId, ZonePatch,
};
pub use repo::{
    AnchorListQuery, CaptureListQuery, ErrorClass, ItemListQuery, RepoError, RepoResult,
    SqliteBreadcrumbRepository,
};
pub use scope::{
    Access, ResourceKind, ResourceRef, ScopeFilter, ScopeResolver, UnscopedPolicy, WriteRefs,
};
pub use search::{SearchHit, SearchQuery};
pub use service::{PresenceTracker, QueryFacade, StopOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
