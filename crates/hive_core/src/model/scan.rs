//! Scan log: append-only record of a physical tag scan.

use super::anchor::AnchorId;
use super::caller::CallerId;
use super::validation::normalize_optional;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ScanLogId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Iphone,
    Watch,
    Laptop,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Iphone => "iphone",
            Self::Watch => "watch",
            Self::Laptop => "laptop",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "iphone" => Some(Self::Iphone),
            "watch" => Some(Self::Watch),
            "laptop" => Some(Self::Laptop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLog {
    pub id: ScanLogId,
    pub anchor_id: AnchorId,
    pub device: DeviceType,
    pub location: Option<String>,
    pub scanned_at: i64,
    pub created_by: CallerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScan {
    /// Raw key as read from the tag; normalized on lookup.
    pub anchor_key: String,
    pub device: DeviceType,
    pub location: Option<String>,
}

impl NewScan {
    pub fn new(anchor_key: impl Into<String>, device: DeviceType) -> Self {
        Self {
            anchor_key: anchor_key.into(),
            device,
            location: None,
        }
    }

    pub(crate) fn normalized_location(&self) -> Option<String> {
        normalize_optional(self.location.as_deref())
    }
}
