//! RouteSet: a named, ordered walk through anchors.

use super::anchor::AnchorId;
use super::caller::CallerId;
use super::patch::Patch;
use super::validation::{
    normalize_optional, normalize_required, ValidationError, ROUTESET_NAME_MAX_CHARS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RouteSetId = Uuid;

/// Ordered list of anchors the owner walks through.
///
/// Owned directly like a zone. `anchor_ids` keeps insertion order and may
/// repeat an anchor; on read it only lists anchors the caller can still see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    pub id: RouteSetId,
    pub name: String,
    pub description: Option<String>,
    pub anchor_ids: Vec<AnchorId>,
    pub owner_id: CallerId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRouteSet {
    pub name: String,
    pub description: Option<String>,
    pub anchor_ids: Vec<AnchorId>,
}

impl NewRouteSet {
    pub fn new(name: impl Into<String>, anchor_ids: Vec<AnchorId>) -> Self {
        Self {
            name: name.into(),
            anchor_ids,
            ..Self::default()
        }
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: normalize_required("name", &self.name, ROUTESET_NAME_MAX_CHARS)?,
            description: normalize_optional(self.description.as_deref()),
            anchor_ids: self.anchor_ids.clone(),
        })
    }
}

/// Partial update. `anchor_ids` replaces every stop when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSetPatch {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub anchor_ids: Option<Vec<AnchorId>>,
}

impl RouteSetPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_keep() && self.anchor_ids.is_none()
    }

    /// Applies name and description; stops are persisted by the repository.
    pub fn apply_to(&self, routeset: &mut RouteSet) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            routeset.name = normalize_required("name", name, ROUTESET_NAME_MAX_CHARS)?;
        }
        routeset.description = self
            .description
            .clone()
            .apply(routeset.description.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        if let Some(anchor_ids) = &self.anchor_ids {
            routeset.anchor_ids = anchor_ids.clone();
        }
        Ok(())
    }
}
