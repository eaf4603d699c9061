use crate::core::{EntityOperation, OptimisticEntityRecord, ScopeKey, SyncError, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{Level, event};

/// A proposal force-purged because its TTL passed without confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredProposal {
    pub scope: ScopeKey,
    pub local_id: String,
    pub entity_id: String,
    pub operation: EntityOperation,
    /// Status at the moment of the purge.
    pub status: SyncStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ExpiredProposal {
    pub fn from_record<T>(scope: &ScopeKey, record: &OptimisticEntityRecord<T>) -> Self {
        Self {
            scope: scope.clone(),
            local_id: record.local_id.clone(),
            entity_id: record.entity_id.clone(),
            operation: record.operation,
            status: record.status,
            expires_at: record.expires_at,
            last_error: record.last_error.clone(),
        }
    }

    pub fn to_error(&self) -> SyncError {
        SyncError::Expired {
            local_id: self.local_id.clone(),
            entity_id: self.entity_id.clone(),
        }
    }

    /// Short user-facing text for a toast.
    pub fn message(&self) -> String {
        format!(
            "Could not save {} of {} '{}': the server did not confirm it in time",
            self.operation, self.scope.entity_type, self.entity_id
        )
    }
}

/// Receives forced purges so the caller can tell the user.
pub trait ExpiryNotifier: Send + Sync {
    fn notify_expired(&self, expired: &ExpiredProposal);
}

/// Logs each purge at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl ExpiryNotifier for TracingNotifier {
    fn notify_expired(&self, expired: &ExpiredProposal) {
        event!(
            Level::WARN,
            scope = %expired.scope,
            local_id = %expired.local_id,
            entity_id = %expired.entity_id,
            operation = %expired.operation,
            "{}",
            expired.message()
        );
    }
}

/// Forwards purges to a channel drained by the notification layer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ExpiredProposal>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExpiredProposal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ExpiryNotifier for ChannelNotifier {
    fn notify_expired(&self, expired: &ExpiredProposal) {
        if self.tx.send(expired.clone()).is_err() {
            event!(Level::DEBUG, local_id = %expired.local_id, "expiry receiver dropped");
        }
    }
}
