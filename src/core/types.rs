use super::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

// ============================================================================
// Entity Capability
// ============================================================================

/// An entity that can be the target of an optimistic proposal.
///
/// `version` is an optional capability: the staleness guard only engages when
/// both the confirmed entity and the proposed entity report one.
pub trait SyncEntity: Clone {
    fn entity_id(&self) -> Cow<'_, str>;

    fn version(&self) -> Option<u64> {
        None
    }
}

impl SyncEntity for serde_json::Value {
    /// String ids pass through, numeric ids are stringified, anything else
    /// reads as an empty id.
    fn entity_id(&self) -> Cow<'_, str> {
        match self.get("id") {
            Some(serde_json::Value::String(id)) => Cow::Borrowed(id.as_str()),
            Some(serde_json::Value::Number(id)) => Cow::Owned(id.to_string()),
            _ => Cow::Borrowed(""),
        }
    }

    fn version(&self) -> Option<u64> {
        self.get("version").and_then(serde_json::Value::as_u64)
    }
}

// ============================================================================
// Operation / Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Sending,
    Success,
    Error,
}

impl SyncStatus {
    /// Pending and sending proposals are still waiting on the remote store.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Sending)
    }

    /// The status shown to renderers. Sending is indistinguishable from pending.
    pub fn display_status(self) -> Self {
        match self {
            Self::Sending => Self::Pending,
            other => other,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Where a projected `create` lands when the entity is not yet in the base list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatePlacement {
    Start,
    #[default]
    End,
}

impl std::str::FromStr for CreatePlacement {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            other => Err(SyncError::Config(format!(
                "unknown create placement '{}', expected 'start' or 'end'",
                other
            ))),
        }
    }
}

// ============================================================================
// Scope Key
// ============================================================================

/// Partition key for one persisted proposal queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub entity_type: String,
    pub scope_id: String,
}

impl ScopeKey {
    pub fn new(entity_type: impl Into<String>, scope_id: impl Into<String>) -> Result<Self> {
        let entity_type = entity_type.into();
        let scope_id = scope_id.into();
        if entity_type.trim().is_empty() {
            return Err(SyncError::InvalidScope(
                "entity_type must not be empty".to_string(),
            ));
        }
        if scope_id.trim().is_empty() {
            return Err(SyncError::InvalidScope(format!(
                "scope_id must not be empty for entity type '{}'",
                entity_type
            )));
        }
        Ok(Self {
            entity_type,
            scope_id,
        })
    }

    /// Storage key shared with the browser client's queue layout.
    pub fn storage_key(&self) -> String {
        format!("optimistic-sync:{}:{}", self.entity_type, self.scope_id)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.scope_id)
    }
}

// ============================================================================
// Optimistic Entity Record
// ============================================================================

/// One proposed mutation, tracked until it is confirmed, fails or expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticEntityRecord<T> {
    pub local_id: String,
    pub entity_type: String,
    pub scope_id: String,
    pub entity_id: String,
    pub operation: EntityOperation,
    pub status: SyncStatus,
    pub entity: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<T>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_at: Option<DateTime<Utc>>,
}

impl<T> OptimisticEntityRecord<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Expired proposals that never succeeded are force-purged.
    pub fn should_purge_at(&self, now: DateTime<Utc>) -> bool {
        self.status != SyncStatus::Success && self.is_expired_at(now)
    }

    pub fn scope_key(&self) -> Result<ScopeKey> {
        ScopeKey::new(self.entity_type.clone(), self.scope_id.clone())
    }
}
