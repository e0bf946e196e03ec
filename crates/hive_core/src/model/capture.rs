//! Capture: immutable raw text with optional scope references.

use super::anchor::AnchorId;
use super::caller::CallerId;
use super::validation::ValidationError;
use super::zone::ZoneId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CaptureId = Uuid;

/// Channel the raw text arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    Text,
    Voice,
    Nfc,
    Import,
}

impl CaptureSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Nfc => "nfc",
            Self::Import => "import",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "nfc" => Some(Self::Nfc),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

/// Read-only once created; ownership derives like [`super::Item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub id: CaptureId,
    pub raw_text: String,
    pub source: CaptureSource,
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
    pub created_by: CallerId,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCapture {
    pub raw_text: String,
    pub source: CaptureSource,
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
}

impl NewCapture {
    pub fn text(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    pub fn in_zone(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn at_anchor(mut self, anchor_id: AnchorId) -> Self {
        self.anchor_id = Some(anchor_id);
        self
    }

    /// Raw text is stored verbatim; only all-blank input is rejected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.raw_text.trim().is_empty() {
            return Err(ValidationError::BlankField("raw_text"));
        }
        Ok(())
    }
}
