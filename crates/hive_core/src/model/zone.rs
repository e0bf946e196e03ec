//! Zone: root of the ownership closure.

use super::caller::CallerId;
use super::patch::Patch;
use super::validation::{
    normalize_optional, normalize_optional_capped, normalize_required, validate_slug,
    ValidationError, ZONE_ICON_MAX_CHARS, ZONE_NAME_MAX_CHARS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ZoneId = Uuid;

/// Top-level owned container.
///
/// `owner_id` is fixed at creation; no update path can change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    /// Globally unique display name.
    pub name: String,
    /// Globally unique kebab-case key.
    pub slug: String,
    pub owner_id: CallerId,
    pub color: Option<String>,
    /// Short icon name or emoji for the zone tile.
    pub icon: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create request for a zone. The owner is always the calling identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewZone {
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
}

impl NewZone {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            ..Self::default()
        }
    }

    /// Returns a trimmed, validated copy.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: normalize_required("name", &self.name, ZONE_NAME_MAX_CHARS)?,
            slug: validate_slug(&self.slug)?,
            color: normalize_optional(self.color.as_deref()),
            icon: normalize_optional_capped("icon", self.icon.as_deref(), ZONE_ICON_MAX_CHARS)?,
            description: normalize_optional(self.description.as_deref()),
        })
    }
}

/// Explicit partial update for a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZonePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub color: Patch<String>,
    pub icon: Patch<String>,
    pub description: Patch<String>,
}

impl ZonePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.color.is_keep()
            && self.icon.is_keep()
            && self.description.is_keep()
    }

    /// Applies the patch to `zone` after validating every present field.
    pub fn apply_to(self, zone: &mut Zone) -> Result<(), ValidationError> {
        if let Some(name) = self.name {
            zone.name = normalize_required("name", &name, ZONE_NAME_MAX_CHARS)?;
        }
        if let Some(slug) = self.slug {
            zone.slug = validate_slug(&slug)?;
        }
        zone.color = self
            .color
            .apply(zone.color.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        zone.icon = normalize_optional_capped(
            "icon",
            self.icon.apply(zone.icon.take()).as_deref(),
            ZONE_ICON_MAX_CHARS,
        )?;
        zone.description = self
            .description
            .apply(zone.description.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        Ok(())
    }
}
