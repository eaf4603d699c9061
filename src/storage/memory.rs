use super::persistence::RecordPersistence;
use crate::core::{Result, ScopeKey, SyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Process-local persistence. Clones share the same backing map, so a test
/// can keep a handle and inspect what a store wrote.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    partitions: Arc<Mutex<HashMap<ScopeKey, Vec<serde_json::Value>>>>,
    fail_saves: Arc<AtomicBool>,
    fail_loads: Arc<AtomicBool>,
    save_count: Arc<AtomicUsize>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a partition as if a previous session had written it.
    pub fn insert(&self, key: ScopeKey, records: Vec<serde_json::Value>) {
        let mut partitions = self.partitions.lock().unwrap_or_else(|p| p.into_inner());
        partitions.insert(key, records);
    }

    pub fn stored(&self, key: &ScopeKey) -> Vec<serde_json::Value> {
        let partitions = self.partitions.lock().unwrap_or_else(|p| p.into_inner());
        partitions.get(key).cloned().unwrap_or_default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordPersistence for InMemoryPersistence {
    async fn load_records(&self, key: &ScopeKey) -> Result<Vec<serde_json::Value>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::Persistence(format!("load of '{}' refused", key)));
        }
        Ok(self.stored(key))
    }

    async fn save_records(&self, key: &ScopeKey, records: Vec<serde_json::Value>) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SyncError::Persistence(format!("save of '{}' refused", key)));
        }
        let mut partitions = self.partitions.lock().unwrap_or_else(|p| p.into_inner());
        if records.is_empty() {
            partitions.remove(key);
        } else {
            partitions.insert(key.clone(), records);
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_scopes(&self) -> Result<Vec<ScopeKey>> {
        let partitions = self.partitions.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys = partitions.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }
}
