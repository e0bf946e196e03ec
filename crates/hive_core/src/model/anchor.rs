//! Anchor: a physical/contextual reference point addressed by a tag key.
//!
//! # Invariants
//! - `anchor_key` is stored uppercase; lookups normalize the same way, so any
//!   caller-supplied casing resolves to one row.
//! - An anchor without `zone_id` has no owner and is governed by the
//!   configured unscoped policy.
//! - Tags are lowercase, unique and sorted.

use super::caller::CallerId;
use super::patch::Patch;
use super::validation::{
    normalize_optional, normalize_optional_capped, normalize_required, validate_latitude,
    validate_longitude, ValidationError, ANCHOR_KEY_MAX_CHARS, ANCHOR_NAME_MAX_CHARS,
    FLOORPLAN_REF_MAX_CHARS, PHOTO_URL_MAX_CHARS, TAG_MAX_CHARS,
};
use super::zone::ZoneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type AnchorId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    /// Canonical (uppercase) external key, e.g. an NFC tag payload.
    pub anchor_key: String,
    pub zone_id: Option<ZoneId>,
    pub name: String,
    pub description: Option<String>,
    pub location_hint: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
    /// Free-form pointer into a floorplan (room code, map pin id).
    pub floorplan_ref: Option<String>,
    pub tags: Vec<String>,
    pub created_by: CallerId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAnchor {
    pub anchor_key: String,
    pub zone_id: Option<ZoneId>,
    pub name: String,
    pub description: Option<String>,
    pub location_hint: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
    pub floorplan_ref: Option<String>,
    pub tags: Vec<String>,
}

impl NewAnchor {
    pub fn new(anchor_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            anchor_key: anchor_key.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn in_zone(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            anchor_key: normalize_anchor_key(&self.anchor_key)?,
            zone_id: self.zone_id,
            name: normalize_required("name", &self.name, ANCHOR_NAME_MAX_CHARS)?,
            description: normalize_optional(self.description.as_deref()),
            location_hint: normalize_optional(self.location_hint.as_deref()),
            latitude: self.latitude.map(validate_latitude).transpose()?,
            longitude: self.longitude.map(validate_longitude).transpose()?,
            photo_url: normalize_optional_capped(
                "photo_url",
                self.photo_url.as_deref(),
                PHOTO_URL_MAX_CHARS,
            )?,
            floorplan_ref: normalize_optional_capped(
                "floorplan_ref",
                self.floorplan_ref.as_deref(),
                FLOORPLAN_REF_MAX_CHARS,
            )?,
            tags: normalize_tags(&self.tags)?,
        })
    }
}

/// Explicit partial update for an anchor. The key itself is immutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorPatch {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub location_hint: Patch<String>,
    pub latitude: Patch<f64>,
    pub longitude: Patch<f64>,
    pub photo_url: Patch<String>,
    pub floorplan_ref: Patch<String>,
    /// Replaces the whole tag set when present.
    pub tags: Option<Vec<String>>,
    /// Re-parenting; the target zone must pass write authorization.
    pub zone_id: Patch<ZoneId>,
}

impl AnchorPatch {
    pub fn apply_to(self, anchor: &mut Anchor) -> Result<(), ValidationError> {
        if let Some(name) = self.name {
            anchor.name = normalize_required("name", &name, ANCHOR_NAME_MAX_CHARS)?;
        }
        anchor.description = self
            .description
            .apply(anchor.description.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        anchor.location_hint = self
            .location_hint
            .apply(anchor.location_hint.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        anchor.latitude = self
            .latitude
            .try_map(validate_latitude)?
            .apply(anchor.latitude);
        anchor.longitude = self
            .longitude
            .try_map(validate_longitude)?
            .apply(anchor.longitude);
        anchor.photo_url = normalize_optional_capped(
            "photo_url",
            self.photo_url.apply(anchor.photo_url.take()).as_deref(),
            PHOTO_URL_MAX_CHARS,
        )?;
        anchor.floorplan_ref = normalize_optional_capped(
            "floorplan_ref",
            self.floorplan_ref.apply(anchor.floorplan_ref.take()).as_deref(),
            FLOORPLAN_REF_MAX_CHARS,
        )?;
        if let Some(tags) = self.tags {
            anchor.tags = normalize_tags(&tags)?;
        }
        anchor.zone_id = self.zone_id.apply(anchor.zone_id);
        Ok(())
    }
}

/// Trims, lowercases and deduplicates tags; blanks are dropped.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > TAG_MAX_CHARS {
            return Err(ValidationError::TooLong {
                field: "tags",
                max: TAG_MAX_CHARS,
            });
        }
        unique.insert(tag);
    }
    Ok(unique.into_iter().collect())
}

/// Canonical form of an anchor key: trimmed and uppercased.
///
/// The length limit applies to the uppercased key, since uppercasing can add
/// characters (`ß` becomes `SS`).
pub fn normalize_anchor_key(raw: &str) -> Result<String, ValidationError> {
    let key = normalize_required("anchor_key", &raw.to_uppercase(), ANCHOR_KEY_MAX_CHARS)?;
    if key.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidAnchorKey(key));
    }
    Ok(key)
}
