use crate::core::{EntityOperation, OptimisticEntityRecord, SyncEntity, SyncError, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

pub const THOUGHT_ENTITY_TYPE: &str = "thought";

/// Section column of a sermon outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SermonSection {
    Introduction,
    Main,
    Conclusion,
    /// Thoughts not yet assigned to a section.
    Ambiguous,
}

impl SermonSection {
    pub const ALL: [Self; 4] = [
        Self::Introduction,
        Self::Main,
        Self::Conclusion,
        Self::Ambiguous,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Main => "main",
            Self::Conclusion => "conclusion",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for SermonSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SermonSection {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == value)
            .ok_or_else(|| SyncError::InvalidScope(format!("unknown sermon section '{}'", value)))
    }
}

/// Payload of a pending thought proposal, as persisted in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingThought {
    pub id: String,
    pub section_id: SermonSection,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_point_id: Option<String>,
}

impl SyncEntity for PendingThought {
    fn entity_id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingThought {
    pub section_id: SermonSection,
    pub text: String,
    pub tags: Vec<String>,
    pub outline_point_id: Option<String>,
}

impl NewPendingThought {
    pub fn new(section_id: SermonSection, text: impl Into<String>) -> Self {
        Self {
            section_id,
            text: text.into(),
            tags: Vec::new(),
            outline_point_id: None,
        }
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn outline_point(mut self, outline_point_id: impl Into<String>) -> Self {
        self.outline_point_id = Some(outline_point_id.into());
        self
    }
}

/// Item as rendered inside a section container, with optional sync badges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_point_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_operation: Option<EntityOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_success_at: Option<DateTime<Utc>>,
}

impl ThoughtItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_outline_point(mut self, outline_point_id: impl Into<String>) -> Self {
        self.outline_point_id = Some(outline_point_id.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Optimistic item built from its proposal.
    pub fn from_record(record: &OptimisticEntityRecord<PendingThought>) -> Self {
        let thought = &record.entity;
        let mut item = Self {
            id: thought.id.clone(),
            content: thought.text.clone(),
            tags: thought.tags.clone(),
            outline_point_id: thought.outline_point_id.clone(),
            ..Self::default()
        };
        item.mirror_record(record);
        item
    }

    pub(crate) fn mirror_record(&mut self, record: &OptimisticEntityRecord<PendingThought>) {
        self.local_id = Some(record.local_id.clone());
        self.sync_status = Some(record.status);
        self.sync_operation = Some(record.operation);
        self.sync_last_error = record.last_error.clone();
        self.sync_expires_at = Some(record.expires_at);
        self.sync_success_at = record.success_at;
    }

    /// The item is the optimistic copy of (or the confirmed replacement for)
    /// the proposal `local_id`.
    pub fn matches_local_id(&self, local_id: &str) -> bool {
        self.id == local_id || self.local_id.as_deref() == Some(local_id)
    }

    pub fn has_sync_metadata(&self) -> bool {
        self.local_id.is_some()
            || self.sync_status.is_some()
            || self.sync_operation.is_some()
            || self.sync_last_error.is_some()
            || self.sync_expires_at.is_some()
            || self.sync_success_at.is_some()
    }

    pub fn clear_sync_metadata(&mut self) {
        self.local_id = None;
        self.sync_status = None;
        self.sync_operation = None;
        self.sync_last_error = None;
        self.sync_expires_at = None;
        self.sync_success_at = None;
    }
}
