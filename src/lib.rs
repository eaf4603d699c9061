// ============================================================================
// Optimistic Sync Library
// ============================================================================

pub mod config;
pub mod core;
pub mod expiry;
pub mod prelude;
pub mod projection;
pub mod storage;
pub mod store;
pub mod thoughts;

// Re-export main types for convenience
pub use config::SyncConfig;
pub use crate::core::{
    Clock, CreatePlacement, EntityOperation, IdGenerator, ManualClock, OptimisticEntityRecord,
    Result, ScopeKey, SequentialIdGenerator, SyncEntity, SyncError, SyncStatus, SystemClock,
    UuidIdGenerator,
};
pub use expiry::{
    ChannelNotifier, ExpiredProposal, ExpiringStore, ExpiryMonitor, ExpiryNotifier,
    TracingNotifier, run_expiry_check, spawn_expiry_monitor,
};
pub use projection::{
    OptimisticSyncState, ProjectionOptions, ProjectionReport, RejectedProposal, RejectionReason,
    SyncStateById, build_optimistic_sync_state_by_id, project_optimistic_entities,
    project_with_report,
};
pub use storage::{FilePersistence, InMemoryPersistence, RecordCodec, RecordPersistence};
pub use store::{MarkStatusOptions, NewRecord, RecordStore, ReplaceEntityOptions, SyncContext};
pub use thoughts::{
    NewPendingThought, PendingThought, SectionContainers, SermonSection, ThoughtItem,
    ThoughtSyncController,
};

// ============================================================================
// Session API
// ============================================================================

/// One user's sync session: owns the expiry monitor for a store and hands
/// out access to it.
///
/// Each session wraps exactly one store instance; there is no global registry.
///
/// # Examples
///
/// ```
/// use optimistic_sync::{EntityOperation, NewRecord, SyncContext, SyncSession, TracingNotifier};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> optimistic_sync::Result<()> {
/// let session = SyncSession::<serde_json::Value>::open(
///     SyncContext::in_memory(),
///     "note",
///     Some("user-1".to_string()),
///     Arc::new(TracingNotifier),
/// )
/// .await?;
///
/// let base = vec![json!({"id": "1", "text": "base"})];
/// {
///     let mut store = session.store().lock().await;
///     store.create_record(NewRecord::new(
///         "1",
///         EntityOperation::Update,
///         json!({"id": "1", "text": "edited"}),
///     ));
///     assert_eq!(store.project(&base)[0]["text"], "edited");
/// }
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncSession<T> {
    store: std::sync::Arc<tokio::sync::Mutex<RecordStore<T>>>,
    monitor: ExpiryMonitor,
}

impl<T> SyncSession<T>
where
    T: SyncEntity + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    /// Opens the store for `(entity_type, scope_id)` and starts its expiry monitor.
    pub async fn open(
        context: SyncContext,
        entity_type: &str,
        scope_id: Option<String>,
        notifier: std::sync::Arc<dyn ExpiryNotifier>,
    ) -> Result<Self> {
        let interval = context.config.expiry_check_interval;
        let store = RecordStore::open(context, entity_type, scope_id).await?;
        let store = std::sync::Arc::new(tokio::sync::Mutex::new(store));
        let monitor = spawn_expiry_monitor(store.clone(), interval, notifier);
        Ok(Self { store, monitor })
    }

    pub fn store(&self) -> &std::sync::Arc<tokio::sync::Mutex<RecordStore<T>>> {
        &self.store
    }

    /// Stops the monitor and drains queued writes.
    pub async fn close(self) -> Result<()> {
        self.monitor.stop().await?;
        self.store.lock().await.flush().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_session_open_and_close() {
        let session = SyncSession::<serde_json::Value>::open(
            SyncContext::in_memory(),
            "note",
            Some("user-1".to_string()),
            Arc::new(TracingNotifier),
        )
        .await
        .unwrap();

        {
            let mut store = session.store().lock().await;
            let record = store.create_record(NewRecord::for_entity(
                EntityOperation::Create,
                json!({"id": "n1"}),
            ));
            assert!(record.is_some());
        }

        session.close().await.unwrap();
    }
}
