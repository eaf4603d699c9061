use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Namespace for proposals created through the generic record store.
pub const RECORD_ID_NAMESPACE: &str = "optimistic";
/// Namespace for optimistic thought items.
pub const THOUGHT_ID_NAMESPACE: &str = "thought";

/// Allocates client-side local ids.
///
/// A single generator is shared by every store that writes into the same
/// entity set, so ids from different namespaces can never collide.
pub trait IdGenerator: Send + Sync {
    fn next_local_id(&self, namespace: &str) -> String;
}

/// Random v4 ids: `{namespace}-{uuid}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_local_id(&self, namespace: &str) -> String {
        format!("{}-{}", namespace, Uuid::new_v4())
    }
}

/// Deterministic ids: `{namespace}-{n}` with one counter across namespaces.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_local_id(&self, namespace: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", namespace, n)
    }
}
