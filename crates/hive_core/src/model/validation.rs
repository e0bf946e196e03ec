//! Input validation shared by model constructors and repository writes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid slug regex"));

pub const ZONE_NAME_MAX_CHARS: usize = 120;
pub const SLUG_MAX_CHARS: usize = 120;
pub const ANCHOR_NAME_MAX_CHARS: usize = 120;
pub const ANCHOR_KEY_MAX_CHARS: usize = 120;
pub const ITEM_TITLE_MAX_CHARS: usize = 255;
pub const ZONE_ICON_MAX_CHARS: usize = 50;
pub const PHOTO_URL_MAX_CHARS: usize = 500;
pub const FLOORPLAN_REF_MAX_CHARS: usize = 200;
pub const TAG_MAX_CHARS: usize = 50;
pub const ROUTESET_NAME_MAX_CHARS: usize = 200;

/// Validation failures for user-supplied fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required text is empty after trim.
    BlankField(&'static str),
    /// Text exceeds the column limit.
    TooLong { field: &'static str, max: usize },
    /// Slug is not lowercase kebab-case.
    InvalidSlug(String),
    /// Anchor key contains inner whitespace.
    InvalidAnchorKey(String),
    /// Latitude/longitude out of range.
    CoordinateOutOfRange { field: &'static str, value: f64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "`{field}` must not be blank"),
            Self::TooLong { field, max } => {
                write!(f, "`{field}` must be at most {max} characters")
            }
            Self::InvalidSlug(value) => write!(
                f,
                "invalid slug `{value}`: use lowercase letters, digits and single dashes"
            ),
            Self::InvalidAnchorKey(value) => {
                write!(f, "invalid anchor key `{value}`: whitespace is not allowed")
            }
            Self::CoordinateOutOfRange { field, value } => {
                write!(f, "`{field}` out of range: {value}")
            }
        }
    }
}

impl Error for ValidationError {}

/// Trims `value` and enforces non-blank plus a maximum length.
pub fn normalize_required(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

/// Trims optional display text; blank collapses to `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// Like [`normalize_optional`], failing when the kept text is too long.
pub fn normalize_optional_capped(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match normalize_optional(value) {
        Some(text) if text.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        other => Ok(other),
    }
}

pub fn validate_slug(value: &str) -> Result<String, ValidationError> {
    let slug = normalize_required("slug", value, SLUG_MAX_CHARS)?;
    if !SLUG_RE.is_match(&slug) {
        return Err(ValidationError::InvalidSlug(slug));
    }
    Ok(slug)
}

pub fn validate_latitude(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (-90.0..=90.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::CoordinateOutOfRange {
            field: "latitude",
            value,
        })
    }
}

pub fn validate_longitude(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (-180.0..=180.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::CoordinateOutOfRange {
            field: "longitude",
            value,
        })
    }
}
