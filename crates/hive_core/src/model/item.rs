//! Item: a task or note, optionally scoped to a zone and/or anchor.

use super::anchor::AnchorId;
use super::caller::CallerId;
use super::patch::Patch;
use super::validation::{
    normalize_optional, normalize_required, ValidationError, ITEM_TITLE_MAX_CHARS,
};
use super::zone::ZoneId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ItemId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Task,
    Note,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Open,
    Done,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Effective owner = zone owner, else anchor's zone owner, else unscoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
    pub title: String,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub status: ItemStatus,
    /// Caller-defined ordering hint; the store does not interpret it.
    pub priority: Option<i64>,
    pub created_by: CallerId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
    pub title: String,
    pub body: Option<String>,
    pub kind: ItemType,
    pub status: ItemStatus,
    pub priority: Option<i64>,
}

impl NewItem {
    pub fn task(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: ItemType::Task,
            ..Self::default()
        }
    }

    pub fn note(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: ItemType::Note,
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

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn normalized(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            zone_id: self.zone_id,
            anchor_id: self.anchor_id,
            title: normalize_required("title", &self.title, ITEM_TITLE_MAX_CHARS)?,
            body: normalize_optional(self.body.as_deref()),
            kind: self.kind,
            status: self.status,
            priority: self.priority,
        })
    }
}

/// Explicit partial update for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub body: Patch<String>,
    pub kind: Option<ItemType>,
    pub status: Option<ItemStatus>,
    pub priority: Patch<i64>,
    pub zone_id: Patch<ZoneId>,
    pub anchor_id: Patch<AnchorId>,
}

impl ItemPatch {
    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(self, item: &mut Item) -> Result<(), ValidationError> {
        if let Some(title) = self.title {
            item.title = normalize_required("title", &title, ITEM_TITLE_MAX_CHARS)?;
        }
        item.body = self
            .body
            .apply(item.body.take())
            .and_then(|value| normalize_optional(Some(value.as_str())));
        if let Some(kind) = self.kind {
            item.kind = kind;
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        item.priority = self.priority.apply(item.priority);
        item.zone_id = self.zone_id.apply(item.zone_id);
        item.anchor_id = self.anchor_id.apply(item.anchor_id);
        Ok(())
    }
}
