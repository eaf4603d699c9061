//! Scoped persistence collaborator: durable key → record-list storage.

use crate::core::{OptimisticEntityRecord, Result, ScopeKey, SyncError};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Level, event};

/// Storage for the proposal queue of one `(entity type, scope id)` partition.
///
/// The list is stored verbatim: implementations must preserve element order
/// and overwrite the whole partition on every save.
#[async_trait]
pub trait RecordPersistence: Send + Sync {
    async fn load_records(&self, key: &ScopeKey) -> Result<Vec<serde_json::Value>>;

    async fn save_records(&self, key: &ScopeKey, records: Vec<serde_json::Value>) -> Result<()>;

    /// Partitions currently holding records. Backends that cannot enumerate
    /// return an empty list.
    async fn list_scopes(&self) -> Result<Vec<ScopeKey>> {
        Ok(Vec::new())
    }
}

pub fn encode_records<T: Serialize>(
    records: &[OptimisticEntityRecord<T>],
) -> Result<Vec<serde_json::Value>> {
    records
        .iter()
        .map(|record| {
            serde_json::to_value(record).map_err(|err| {
                SyncError::Serialization(format!(
                    "encode record '{}': {}",
                    record.local_id, err
                ))
            })
        })
        .collect()
}

/// Decodes a stored partition. Records that no longer match the entity shape,
/// or that belong to a different partition, are dropped with a warning.
pub fn decode_records<T: DeserializeOwned>(
    key: &ScopeKey,
    raw: Vec<serde_json::Value>,
) -> Vec<OptimisticEntityRecord<T>> {
    let mut records = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<OptimisticEntityRecord<T>>(value) {
            Ok(record) => {
                if record.entity_type != key.entity_type || record.scope_id != key.scope_id {
                    event!(
                        Level::WARN,
                        scope = %key,
                        local_id = %record.local_id,
                        "dropping persisted record from a foreign partition"
                    );
                    continue;
                }
                records.push(record);
            }
            Err(err) => {
                event!(Level::WARN, scope = %key, error = %err, "skipping unreadable persisted record");
            }
        }
    }
    records
}
