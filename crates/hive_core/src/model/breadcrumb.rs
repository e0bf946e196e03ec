//! Breadcrumb: one continuous presence session at an anchor.
//!
//! # Invariants
//! - At most one breadcrumb per owner has `active == true`.
//! - `last_action_at >= started_at`.
//! - Rows are append-only history; only an anchor delete removes them.

use super::anchor::AnchorId;
use super::caller::CallerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BreadcrumbId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: BreadcrumbId,
    pub anchor_id: AnchorId,
    /// Caller that started the session.
    pub owner_id: CallerId,
    pub started_at: i64,
    pub last_action_at: i64,
    pub active: bool,
}

impl Breadcrumb {
    /// Dwell time so far (active) or total (closed), in milliseconds.
    pub fn dwell_ms(&self) -> i64 {
        self.last_action_at - self.started_at
    }
}

/// Projection of a caller's presence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresenceState {
    Idle,
    Active {
        breadcrumb_id: BreadcrumbId,
        anchor_id: AnchorId,
    },
}

impl PresenceState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

impl From<Option<&Breadcrumb>> for PresenceState {
    fn from(value: Option<&Breadcrumb>) -> Self {
        match value {
            Some(breadcrumb) if breadcrumb.active => Self::Active {
                breadcrumb_id: breadcrumb.id,
                anchor_id: breadcrumb.anchor_id,
            },
            _ => Self::Idle,
        }
    }
}
