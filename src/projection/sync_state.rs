use crate::core::{EntityOperation, OptimisticEntityRecord, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-entity status badge data for renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticSyncState {
    pub status: SyncStatus,
    pub operation: EntityOperation,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_at: Option<DateTime<Utc>>,
}

pub type SyncStateById = BTreeMap<String, OptimisticSyncState>;

/// Folds records in order; the last record for an entity id wins.
pub fn build_optimistic_sync_state_by_id<T>(records: &[OptimisticEntityRecord<T>]) -> SyncStateById {
    records
        .iter()
        .map(|record| {
            (
                record.entity_id.clone(),
                OptimisticSyncState {
                    status: record.status.display_status(),
                    operation: record.operation,
                    expires_at: record.expires_at,
                    last_error: record.last_error.clone(),
                    success_at: record.success_at,
                },
            )
        })
        .collect()
}
