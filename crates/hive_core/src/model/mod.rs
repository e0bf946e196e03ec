//! Domain model for zones, anchors and the records hosted by them.
//!
//! # Responsibility
//! - Define canonical data structures used by scoping and presence logic.
//! - Own input normalization and validation rules shared by every write path.
//!
//! # Invariants
//! - Every record is identified by a stable UUID v4.
//! - `Zone` and `RouteSet` carry an owner; every other record derives its
//!   owner through optional zone/anchor references.
//! - Timestamps are Unix epoch milliseconds.

pub mod anchor;
pub mod breadcrumb;
pub mod caller;
pub mod capture;
pub mod item;
pub mod patch;
pub mod routeset;
pub mod scan;
pub mod validation;
pub mod zone;

pub use anchor::{
    normalize_anchor_key, normalize_tags, Anchor, AnchorId, AnchorPatch, NewAnchor,
};
pub use breadcrumb::{Breadcrumb, BreadcrumbId, PresenceState};
pub use caller::CallerId;
pub use capture::{Capture, CaptureId, CaptureSource, NewCapture};
pub use item::{Item, ItemId, ItemPatch, ItemStatus, ItemType, NewItem};
pub use patch::Patch;
pub use routeset::{NewRouteSet, RouteSet, RouteSetId, RouteSetPatch};
pub use scan::{DeviceType, NewScan, ScanLog, ScanLogId};
pub use validation::ValidationError;
pub use zone::{NewZone, Zone, ZoneId, ZonePatch};
