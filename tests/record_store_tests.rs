use chrono::{Duration, TimeZone, Utc};
use optimistic_sync::store::RESUMED_SENDING_ERROR;
use optimistic_sync::{
    EntityOperation, FilePersistence, InMemoryPersistence, ManualClock, MarkStatusOptions,
    NewRecord, RecordCodec, RecordStore, ReplaceEntityOptions, ScopeKey, SequentialIdGenerator,
    SyncConfig, SyncContext, SyncEntity, SyncStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: String,
    text: String,
    #[serde(default)]
    version: Option<u64>,
}

impl Note {
    fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            version: None,
        }
    }
}

impl SyncEntity for Note {
    fn entity_id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }

    fn version(&self) -> Option<u64> {
        self.version
    }
}

fn context(persistence: &InMemoryPersistence, clock: &ManualClock) -> SyncContext {
    SyncContext::new(Arc::new(persistence.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_id_generator(Arc::new(SequentialIdGenerator::new()))
}

fn start_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
}

fn note_key() -> ScopeKey {
    ScopeKey::new("note", "user-1").unwrap()
}

#[tokio::test]
async fn create_record_stamps_lifecycle_fields() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();

    let record = store
        .create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "hello")))
        .unwrap();

    assert_eq!(record.local_id, "optimistic-1");
    assert_eq!(record.entity_type, "note");
    assert_eq!(record.scope_id, "user-1");
    assert_eq!(record.status, SyncStatus::Pending);
    assert_eq!(record.created_at, clock_now(&clock));
    assert_eq!(record.last_attempt_at, record.created_at);
    assert_eq!(record.expires_at, record.created_at + Duration::minutes(30));
    assert_eq!(store.len(), 1);
}

fn clock_now(clock: &ManualClock) -> chrono::DateTime<Utc> {
    optimistic_sync::Clock::now(clock)
}

#[tokio::test]
async fn create_record_without_scope_is_refused() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", None)
        .await
        .unwrap();

    let created = store.create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "x")));

    assert!(created.is_none());
    assert!(store.is_empty());
    store.flush().await;
    assert_eq!(persistence.save_count(), 0);
}

#[tokio::test]
async fn every_mutation_overwrites_the_persisted_list() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();

    let first = store
        .create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "a")))
        .unwrap();
    let second = store
        .create_record(NewRecord::for_entity(EntityOperation::Update, Note::new("n2", "b")))
        .unwrap();
    store.mark_record_status(&first.local_id, SyncStatus::Sending, MarkStatusOptions::default());
    store.flush().await;

    let stored = persistence.stored(&note_key());
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0]["localId"], first.local_id.as_str());
    assert_eq!(stored[0]["status"], "sending");
    assert_eq!(stored[1]["localId"], second.local_id.as_str());

    store.remove_record(&first.local_id);
    store.remove_record(&second.local_id);
    store.flush().await;
    assert!(persistence.stored(&note_key()).is_empty());
}

#[tokio::test]
async fn mark_status_only_extends_ttl_for_in_flight_states() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    let record = store
        .create_record(NewRecord::for_entity(EntityOperation::Update, Note::new("n1", "a")))
        .unwrap();

    clock.advance(Duration::minutes(10));
    store.mark_record_status(&record.local_id, SyncStatus::Sending, MarkStatusOptions::default());
    let sending = store.get_record_by_local_id(&record.local_id).unwrap().clone();
    assert_eq!(sending.expires_at, clock_now(&clock) + Duration::minutes(30));

    clock.advance(Duration::minutes(5));
    store.mark_record_status(&record.local_id, SyncStatus::Error, MarkStatusOptions::error("503 from server"));
    let failed = store.get_record_by_local_id(&record.local_id).unwrap();
    assert_eq!(failed.status, SyncStatus::Error);
    assert_eq!(failed.last_error.as_deref(), Some("503 from server"));
    assert_eq!(failed.expires_at, sending.expires_at);
    assert_eq!(failed.last_attempt_at, sending.last_attempt_at);
}

#[tokio::test]
async fn mark_status_on_unknown_id_is_a_no_op() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();

    assert!(!store.mark_record_status("missing", SyncStatus::Error, MarkStatusOptions::default()));
    assert!(!store.update_record("missing", |record| record));
    assert!(store.remove_record("missing").is_none());
    store.flush().await;
    assert_eq!(persistence.save_count(), 0);
}

#[tokio::test]
async fn replace_entity_keeps_local_id_and_adopts_server_id() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    let record = store
        .create_record(NewRecord::new("tmp-1", EntityOperation::Create, Note::new("tmp-1", "draft")))
        .unwrap();

    store.replace_record_entity(
        &record.local_id,
        Note::new("srv-9", "draft"),
        ReplaceEntityOptions::default().entity_id("srv-9"),
    );

    let replaced = store.get_record_by_local_id(&record.local_id).unwrap();
    assert_eq!(replaced.entity_id, "srv-9");
    assert_eq!(replaced.entity.id, "srv-9");
    assert!(store.get_latest_record_by_entity_id("tmp-1").is_none());
    assert_eq!(store.get_latest_record_by_entity_id("srv-9").unwrap().local_id, record.local_id);
}

#[tokio::test]
async fn latest_record_by_entity_id_is_last_in_order() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    store.create_record(NewRecord::for_entity(EntityOperation::Update, Note::new("n1", "first")));
    let last = store
        .create_record(NewRecord::for_entity(EntityOperation::Update, Note::new("n1", "second")))
        .unwrap();

    let latest = store.get_latest_record_by_entity_id("n1").unwrap();
    assert_eq!(latest.local_id, last.local_id);
    assert_eq!(latest.entity.text, "second");

    let base = vec![Note::new("n1", "server")];
    assert_eq!(store.project(&base)[0].text, "second");
}

#[tokio::test]
async fn update_record_replaces_functionally() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    let record = store
        .create_record(NewRecord::for_entity(EntityOperation::Update, Note::new("n1", "a")))
        .unwrap();

    let updated = store.update_record(&record.local_id, |mut current| {
        current.entity.text = "b".to_string();
        current.snapshot = Some(Note::new("n1", "a"));
        current
    });

    assert!(updated);
    let current = store.get_record_by_local_id(&record.local_id).unwrap();
    assert_eq!(current.entity.text, "b");
    assert_eq!(current.snapshot.as_ref().unwrap().text, "a");
}

#[tokio::test]
async fn update_record_cannot_change_record_identity() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    let first = store
        .create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "a")))
        .unwrap();
    let second = store
        .create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n2", "b")))
        .unwrap();

    let updated = store.update_record(&second.local_id, |mut current| {
        current.local_id = first.local_id.clone();
        current.entity_type = "task".to_string();
        current.scope_id = "user-2".to_string();
        current.entity.text = "b2".to_string();
        current
    });

    assert!(updated);
    let current = store.get_record_by_local_id(&second.local_id).unwrap();
    assert_eq!(current.entity_type, "note");
    assert_eq!(current.scope_id, "user-1");
    assert_eq!(current.entity.text, "b2");
    assert_eq!(store.get_record_by_local_id(&first.local_id).unwrap().entity.text, "a");
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn ttl_beyond_cap_is_rejected_at_open() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let context = context(&persistence, &clock)
        .with_config(SyncConfig::new().ttl(std::time::Duration::from_millis(u64::MAX / 2)));

    let result = RecordStore::<Note>::open(context, "note", Some("user-1".to_string())).await;

    assert!(matches!(result, Err(optimistic_sync::SyncError::Config(_))));
}

#[tokio::test]
async fn reload_reclassifies_sending_records_as_errors() {
    let persistence = InMemoryPersistence::new();
    persistence.insert(
        note_key(),
        vec![
            json!({
                "localId": "optimistic-1", "entityType": "note", "scopeId": "user-1",
                "entityId": "n1", "operation": "create", "status": "sending",
                "entity": {"id": "n1", "text": "in flight"},
                "createdAt": "2026-03-01T09:00:00Z", "lastAttemptAt": "2026-03-01T09:00:00Z",
                "expiresAt": "2026-03-01T09:30:00Z"
            }),
            json!({
                "localId": "optimistic-2", "entityType": "note", "scopeId": "user-1",
                "entityId": "n2", "operation": "update", "status": "pending",
                "entity": {"id": "n2", "text": "queued"},
                "createdAt": "2026-03-01T09:00:00Z", "lastAttemptAt": "2026-03-01T09:00:00Z",
                "expiresAt": "2026-03-01T09:30:00Z"
            }),
        ],
    );
    let clock = start_clock();

    let store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();

    let resumed = store.get_record_by_local_id("optimistic-1").unwrap();
    assert_eq!(resumed.status, SyncStatus::Error);
    assert_eq!(resumed.last_error.as_deref(), Some(RESUMED_SENDING_ERROR));
    assert_eq!(store.get_record_by_local_id("optimistic-2").unwrap().status, SyncStatus::Pending);

    let stored = persistence.stored(&note_key());
    assert_eq!(stored[0]["status"], "error");
    assert_eq!(stored[1]["status"], "pending");
    assert_eq!(persistence.save_count(), 1);
}

#[tokio::test]
async fn persistence_failures_never_reach_callers() {
    let persistence = InMemoryPersistence::new();
    persistence.set_fail_loads(true);
    persistence.set_fail_saves(true);
    let clock = start_clock();

    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    let record = store.create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "a")));
    store.flush().await;

    assert!(record.is_some());
    assert_eq!(store.len(), 1);
    assert!(persistence.stored(&note_key()).is_empty());
}

#[tokio::test]
async fn set_scope_switches_partitions() {
    let persistence = InMemoryPersistence::new();
    let clock = start_clock();
    let mut store = RecordStore::<Note>::open(context(&persistence, &clock), "note", Some("user-1".to_string()))
        .await
        .unwrap();
    store.create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "a")));

    store.set_scope(Some("user-2".to_string())).await;
    assert!(store.is_empty());
    assert_eq!(store.scope_id(), Some("user-2"));

    store.set_scope(Some("user-1".to_string())).await;
    assert_eq!(store.len(), 1);

    store.set_scope(None).await;
    assert!(store.is_empty());
    assert!(store.scope_key().is_none());
}

#[tokio::test]
async fn file_backed_queue_survives_restart() {
    let dir = tempdir().unwrap();
    let config = SyncConfig::new().storage_dir(dir.path()).codec(RecordCodec::MessagePack);

    let local_id = {
        let mut store = RecordStore::<Note>::open(
            SyncContext::from_config(config.clone()).unwrap(),
            "note",
            Some("user-1".to_string()),
        )
        .await
        .unwrap();
        let record = store
            .create_record(NewRecord::for_entity(EntityOperation::Create, Note::new("n1", "durable")))
            .unwrap();
        store.mark_record_status(&record.local_id, SyncStatus::Sending, MarkStatusOptions::default());
        store.flush().await;
        record.local_id
    };

    let persistence = FilePersistence::new(dir.path()).with_codec(RecordCodec::MessagePack);
    assert!(persistence.queue_path(&note_key()).exists());

    let reopened = RecordStore::<Note>::open(
        SyncContext::from_config(config).unwrap(),
        "note",
        Some("user-1".to_string()),
    )
    .await
    .unwrap();

    let record = reopened.get_record_by_local_id(&local_id).unwrap();
    assert_eq!(record.entity.text, "durable");
    assert_eq!(record.status, SyncStatus::Error);
}

#[tokio::test]
async fn blank_entity_type_is_rejected() {
    let result = RecordStore::<Note>::open(SyncContext::in_memory(), " ", Some("user-1".to_string())).await;
    assert!(result.is_err());
}
