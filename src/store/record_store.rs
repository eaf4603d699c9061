use super::context::SyncContext;
use crate::core::{
    EntityOperation, OptimisticEntityRecord, RECORD_ID_NAMESPACE, Result, ScopeKey, SyncEntity,
    SyncError, SyncStatus,
};
use crate::expiry::ExpiredProposal;
use crate::projection::{
    ProjectionOptions, ProjectionReport, SyncStateById, build_optimistic_sync_state_by_id,
    project_optimistic_entities, project_with_report,
};
use crate::storage::PersistenceWriter;
use crate::storage::persistence::{decode_records, encode_records};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Level, event, info_span};

/// `last_error` given to a proposal that was mid-flight when its session ended.
pub const RESUMED_SENDING_ERROR: &str =
    "Sync was interrupted before the server confirmed this change";

/// Input for [`RecordStore::create_record`].
#[derive(Debug, Clone)]
pub struct NewRecord<T> {
    pub entity_id: String,
    pub operation: EntityOperation,
    pub entity: T,
    pub snapshot: Option<T>,
    pub status: Option<SyncStatus>,
}

impl<T> NewRecord<T> {
    pub fn new(entity_id: impl Into<String>, operation: EntityOperation, entity: T) -> Self {
        Self {
            entity_id: entity_id.into(),
            operation,
            entity,
            snapshot: None,
            status: None,
        }
    }

    pub fn snapshot(mut self, snapshot: T) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl<T: SyncEntity> NewRecord<T> {
    /// Targets the entity's own id.
    pub fn for_entity(operation: EntityOperation, entity: T) -> Self {
        let entity_id = entity.entity_id().into_owned();
        Self::new(entity_id, operation, entity)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkStatusOptions {
    pub error: Option<String>,
    /// Overrides the default: re-stamp only for `pending` and `sending`.
    pub reset_expiry: Option<bool>,
    pub success_at: Option<DateTime<Utc>>,
}

impl MarkStatusOptions {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn reset_expiry(mut self, reset: bool) -> Self {
        self.reset_expiry = Some(reset);
        self
    }

    pub fn success_at(mut self, at: DateTime<Utc>) -> Self {
        self.success_at = Some(at);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceEntityOptions<T> {
    pub entity_id: Option<String>,
    pub snapshot: Option<T>,
}

impl<T> Default for ReplaceEntityOptions<T> {
    fn default() -> Self {
        Self {
            entity_id: None,
            snapshot: None,
        }
    }
}

impl<T> ReplaceEntityOptions<T> {
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn snapshot(mut self, snapshot: T) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// In-memory ledger of proposals for one `(entity type, scope id)` with
/// write-through to scoped persistence.
///
/// Mutations are synchronous and never fail. Every mutation that changes the
/// ledger queues a full overwrite of the partition; the write is not awaited.
pub struct RecordStore<T> {
    entity_type: String,
    scope_id: Option<String>,
    records: Vec<OptimisticEntityRecord<T>>,
    context: SyncContext,
    writer: PersistenceWriter,
}

impl<T> RecordStore<T>
where
    T: SyncEntity + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Opens the ledger and loads the scope's persisted queue. `scope_id` may
    /// be `None` while the owner is unresolved (for example before sign-in).
    pub async fn open(
        context: SyncContext,
        entity_type: impl Into<String>,
        scope_id: Option<String>,
    ) -> Result<Self> {
        let entity_type = entity_type.into();
        if entity_type.trim().is_empty() {
            return Err(SyncError::InvalidScope(
                "entity_type must not be empty".to_string(),
            ));
        }
        context.config.validate()?;

        let writer = PersistenceWriter::spawn(context.persistence.clone());
        let mut store = Self {
            entity_type,
            scope_id: normalize_scope_id(scope_id),
            records: Vec::new(),
            context,
            writer,
        };
        store.load_scope().await;
        Ok(store)
    }

    /// Switches to another scope. Queued writes for the old scope are drained
    /// first, then the new scope is loaded and normalized.
    pub async fn set_scope(&mut self, scope_id: Option<String>) {
        let scope_id = normalize_scope_id(scope_id);
        if scope_id == self.scope_id {
            return;
        }
        self.writer.flush().await;
        self.scope_id = scope_id;
        self.load_scope().await;
    }

    async fn load_scope(&mut self) {
        self.records.clear();
        let Some(key) = self.scope_key() else {
            return;
        };

        let raw = match self.context.persistence.load_records(&key).await {
            Ok(raw) => raw,
            Err(err) => {
                event!(Level::WARN, scope = %key, error = %err, "queue load failed; starting empty");
                Vec::new()
            }
        };

        let mut records = decode_records::<T>(&key, raw);
        let resumed = normalize_resumed_records(&mut records);
        if resumed > 0 {
            event!(
                Level::WARN,
                scope = %key,
                resumed,
                "proposals interrupted mid-flight reclassified as errors"
            );
            match encode_records(&records) {
                Ok(encoded) => {
                    if let Err(err) = self.context.persistence.save_records(&key, encoded).await {
                        event!(Level::WARN, scope = %key, error = %err, "queue persist failed");
                    }
                }
                Err(err) => {
                    event!(Level::WARN, scope = %key, error = %err, "queue encode failed");
                }
            }
        }

        event!(Level::DEBUG, scope = %key, records = records.len(), "queue loaded");
        self.records = records;
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn scope_key(&self) -> Option<ScopeKey> {
        let scope_id = self.scope_id.as_ref()?;
        ScopeKey::new(self.entity_type.clone(), scope_id.clone()).ok()
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn records(&self) -> &[OptimisticEntityRecord<T>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Appends a new proposal. Returns `None`, leaving the ledger untouched,
    /// when the scope is unresolved.
    pub fn create_record(&mut self, input: NewRecord<T>) -> Option<OptimisticEntityRecord<T>> {
        let local_id = self.context.ids.next_local_id(RECORD_ID_NAMESPACE);
        self.create_record_with_local_id(local_id, input)
    }

    /// Appends a proposal under a caller-allocated local id.
    pub fn create_record_with_local_id(
        &mut self,
        local_id: String,
        input: NewRecord<T>,
    ) -> Option<OptimisticEntityRecord<T>> {
        let Some(scope_id) = self.scope_id.clone() else {
            event!(
                Level::DEBUG,
                entity_type = %self.entity_type,
                "proposal skipped: scope unresolved"
            );
            return None;
        };
        if self.records.iter().any(|record| record.local_id == local_id) {
            event!(Level::WARN, local_id = %local_id, "proposal skipped: duplicate local id");
            return None;
        }

        let now = self.context.clock.now();
        let record = OptimisticEntityRecord {
            local_id,
            entity_type: self.entity_type.clone(),
            scope_id,
            entity_id: input.entity_id,
            operation: input.operation,
            status: input.status.unwrap_or_default(),
            entity: input.entity,
            snapshot: input.snapshot,
            created_at: now,
            last_attempt_at: now,
            expires_at: expiry_after(now, self.context.config.ttl_chrono()),
            last_error: None,
            success_at: None,
        };

        let span = info_span!(
            "sync.record.create",
            local_id = %record.local_id,
            entity_id = %record.entity_id,
            operation = %record.operation
        );
        let _enter = span.enter();

        self.records.push(record.clone());
        self.persist();
        event!(Level::DEBUG, "proposal recorded");
        Some(record)
    }

    /// Functional replace of one record. Unknown ids are a no-op. The local id
    /// and partition fields always survive the updater.
    pub fn update_record<F>(&mut self, local_id: &str, updater: F) -> bool
    where
        F: FnOnce(OptimisticEntityRecord<T>) -> OptimisticEntityRecord<T>,
    {
        let Some(index) = self.index_of(local_id) else {
            return false;
        };
        let current = self.records[index].clone();
        let mut next = updater(current);
        let slot = &mut self.records[index];
        if next.local_id != slot.local_id
            || next.entity_type != slot.entity_type
            || next.scope_id != slot.scope_id
        {
            event!(Level::WARN, local_id = %local_id, "updater tried to move the record; identity restored");
            next.local_id = slot.local_id.clone();
            next.entity_type = slot.entity_type.clone();
            next.scope_id = slot.scope_id.clone();
        }
        *slot = next;
        self.persist();
        true
    }

    pub fn mark_record_status(
        &mut self,
        local_id: &str,
        status: SyncStatus,
        options: MarkStatusOptions,
    ) -> bool {
        let now = self.context.clock.now();
        let ttl = self.context.config.ttl_chrono();
        let Some(index) = self.index_of(local_id) else {
            return false;
        };

        let record = &mut self.records[index];
        apply_status(record, status, options, now, ttl);
        event!(
            Level::DEBUG,
            local_id = %local_id,
            status = %status,
            error = record.last_error.as_deref().unwrap_or_default(),
            "proposal status changed"
        );
        self.persist();
        true
    }

    /// Swaps the proposed value (and optionally the server-assigned entity id)
    /// while keeping the same local id.
    pub fn replace_record_entity(
        &mut self,
        local_id: &str,
        entity: T,
        options: ReplaceEntityOptions<T>,
    ) -> bool {
        let Some(index) = self.index_of(local_id) else {
            return false;
        };

        let record = &mut self.records[index];
        record.entity = entity;
        if let Some(entity_id) = options.entity_id {
            record.entity_id = entity_id;
        }
        if let Some(snapshot) = options.snapshot {
            record.snapshot = Some(snapshot);
        }
        self.persist();
        true
    }

    pub fn remove_record(&mut self, local_id: &str) -> Option<OptimisticEntityRecord<T>> {
        let index = self.index_of(local_id)?;
        let removed = self.records.remove(index);
        self.persist();
        event!(Level::DEBUG, local_id = %local_id, "proposal removed");
        Some(removed)
    }

    /// Drops every proposal of the scope.
    pub fn clear(&mut self) {
        if self.records.is_empty() {
            return;
        }
        self.records.clear();
        self.persist();
    }

    // ------------------------------------------------------------------------
    // Lookups & projection
    // ------------------------------------------------------------------------

    pub fn get_record_by_local_id(&self, local_id: &str) -> Option<&OptimisticEntityRecord<T>> {
        self.records.iter().find(|record| record.local_id == local_id)
    }

    /// Last record in list order targeting `entity_id`.
    pub fn get_latest_record_by_entity_id(
        &self,
        entity_id: &str,
    ) -> Option<&OptimisticEntityRecord<T>> {
        self.records
            .iter()
            .rev()
            .find(|record| record.entity_id == entity_id)
    }

    pub fn project(&self, base: &[T]) -> Vec<T> {
        project_optimistic_entities(base, &self.records, self.projection_options())
    }

    pub fn project_with_report(&self, base: &[T]) -> ProjectionReport<T> {
        project_with_report(base, &self.records, self.projection_options())
    }

    pub fn sync_state_by_id(&self) -> SyncStateById {
        build_optimistic_sync_state_by_id(&self.records)
    }

    fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions::new(self.context.config.create_placement)
    }

    // ------------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------------

    /// Removes every non-successful proposal whose TTL has passed at `now`.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> Vec<ExpiredProposal> {
        let Some(key) = self.scope_key() else {
            return Vec::new();
        };

        let candidates = self
            .records
            .iter()
            .filter(|record| record.should_purge_at(now))
            .map(|record| record.local_id.clone())
            .collect::<Vec<_>>();

        let mut expired = Vec::with_capacity(candidates.len());
        for local_id in candidates {
            // Gone already (confirmed or discarded since the scan): nothing to do.
            let Some(index) = self.index_of(&local_id) else {
                continue;
            };
            let record = self.records.remove(index);
            expired.push(ExpiredProposal::from_record(&key, &record));
        }

        if !expired.is_empty() {
            event!(Level::WARN, scope = %key, expired = expired.len(), "expired proposals purged");
            self.persist();
        }
        expired
    }

    pub fn purge_expired(&mut self) -> Vec<ExpiredProposal> {
        let now = self.context.clock.now();
        self.purge_expired_at(now)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Waits for every queued write to be attempted.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    fn persist(&self) {
        let Some(key) = self.scope_key() else {
            return;
        };
        match encode_records(&self.records) {
            Ok(encoded) => self.writer.enqueue(key, encoded),
            Err(err) => {
                event!(Level::WARN, scope = %key, error = %err, "queue encode failed");
            }
        }
    }

    fn index_of(&self, local_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.local_id == local_id)
    }
}

impl<T> std::fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("entity_type", &self.entity_type)
            .field("scope_id", &self.scope_id)
            .field("records", &self.records.len())
            .finish()
    }
}

pub(crate) fn normalize_scope_id(scope_id: Option<String>) -> Option<String> {
    scope_id.filter(|id| !id.trim().is_empty())
}

/// Applies a status transition. Only `pending` and `sending` extend the TTL
/// unless the caller says otherwise.
pub(crate) fn apply_status<T>(
    record: &mut OptimisticEntityRecord<T>,
    status: SyncStatus,
    options: MarkStatusOptions,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) {
    record.status = status;
    record.last_error = match options.error {
        Some(error) => Some(error),
        None if status == SyncStatus::Error => record.last_error.take(),
        None => None,
    };
    record.success_at = match options.success_at {
        Some(at) => Some(at),
        None if status == SyncStatus::Success => Some(now),
        None => None,
    };
    if options.reset_expiry.unwrap_or(status.is_in_flight()) {
        record.last_attempt_at = now;
        record.expires_at = expiry_after(now, ttl);
    }
}

/// Saturates at the latest representable instant instead of overflowing.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A session that ended while a proposal was `sending` cannot know whether the
/// server applied it. Such records become `error`. Returns how many changed.
pub(crate) fn normalize_resumed_records<T>(records: &mut [OptimisticEntityRecord<T>]) -> usize {
    let mut changed = 0;
    for record in records
        .iter_mut()
        .filter(|record| record.status == SyncStatus::Sending)
    {
        record.status = SyncStatus::Error;
        if record.last_error.is_none() {
            record.last_error = Some(RESUMED_SENDING_ERROR.to_string());
        }
        changed += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use chrono::Duration;

    fn record(status: SyncStatus) -> OptimisticEntityRecord<serde_json::Value> {
        let now = Utc::now();
        OptimisticEntityRecord {
            local_id: "l1".to_string(),
            entity_type: "note".to_string(),
            scope_id: "u1".to_string(),
            entity_id: "n1".to_string(),
            operation: EntityOperation::Update,
            status,
            entity: serde_json::json!({"id": "n1"}),
            snapshot: None,
            created_at: now,
            last_attempt_at: now,
            expires_at: now,
            last_error: None,
            success_at: None,
        }
    }

    #[test]
    fn test_terminal_status_keeps_expiry() {
        let clock = ManualClock::default();
        let mut record = record(SyncStatus::Sending);
        let original_expiry = record.expires_at;
        clock.advance(Duration::minutes(5));

        apply_status(
            &mut record,
            SyncStatus::Error,
            MarkStatusOptions::error("timeout"),
            crate::core::Clock::now(&clock),
            Duration::minutes(30),
        );

        assert_eq!(record.expires_at, original_expiry);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_in_flight_status_extends_expiry() {
        let mut record = record(SyncStatus::Error);
        record.last_error = Some("offline".to_string());
        let now = record.created_at + Duration::minutes(10);

        apply_status(&mut record, SyncStatus::Pending, MarkStatusOptions::default(), now, Duration::minutes(30));

        assert_eq!(record.expires_at, now + Duration::minutes(30));
        assert_eq!(record.last_attempt_at, now);
        assert_eq!(record.last_error, None);
    }

    #[test]
    fn test_explicit_reset_on_terminal_status() {
        let mut record = record(SyncStatus::Sending);
        let now = record.created_at + Duration::minutes(1);

        apply_status(
            &mut record,
            SyncStatus::Success,
            MarkStatusOptions::default().reset_expiry(true),
            now,
            Duration::minutes(30),
        );

        assert_eq!(record.expires_at, now + Duration::minutes(30));
        assert_eq!(record.success_at, Some(now));
    }

    #[test]
    fn test_expiry_saturates_instead_of_overflowing() {
        let mut record = record(SyncStatus::Error);
        let now = DateTime::<Utc>::MAX_UTC - Duration::minutes(1);

        apply_status(&mut record, SyncStatus::Pending, MarkStatusOptions::default(), now, Duration::minutes(30));

        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_normalize_resumed_records() {
        let mut records = vec![record(SyncStatus::Sending), record(SyncStatus::Pending)];
        records[1].local_id = "l2".to_string();

        assert_eq!(normalize_resumed_records(&mut records), 1);
        assert_eq!(records[0].status, SyncStatus::Error);
        assert_eq!(records[0].last_error.as_deref(), Some(RESUMED_SENDING_ERROR));
        assert_eq!(records[1].status, SyncStatus::Pending);
    }
}
