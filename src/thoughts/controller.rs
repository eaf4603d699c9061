use super::containers::SectionContainers;
use super::model::{NewPendingThought, PendingThought, THOUGHT_ENTITY_TYPE, ThoughtItem};
use crate::core::{
    EntityOperation, OptimisticEntityRecord, Result, SyncStatus, THOUGHT_ID_NAMESPACE,
};
use crate::expiry::{ExpiredProposal, ExpiringStore};
use crate::projection::SyncStateById;
use crate::store::{MarkStatusOptions, NewRecord, RecordStore, SyncContext};
use chrono::{DateTime, Utc};
use tracing::{Level, event, info_span};

/// Optimistic thought creation for one sermon.
///
/// Owns the thought proposal ledger and the section containers the UI
/// renders, and keeps the two in step: every proposal has exactly one item,
/// placed by section and outline point.
pub struct ThoughtSyncController {
    store: RecordStore<PendingThought>,
    containers: SectionContainers,
}

impl ThoughtSyncController {
    /// Opens the ledger for `sermon_id` and hydrates persisted proposals into
    /// `containers`.
    pub async fn open(
        context: SyncContext,
        sermon_id: Option<String>,
        containers: SectionContainers,
    ) -> Result<Self> {
        let store = RecordStore::open(context, THOUGHT_ENTITY_TYPE, sermon_id).await?;
        let mut controller = Self { store, containers };
        controller.hydrate();
        Ok(controller)
    }

    /// Switches sermon: loads its ledger and hydrates into the new containers.
    pub async fn set_sermon(&mut self, sermon_id: Option<String>, containers: SectionContainers) {
        self.store.set_scope(sermon_id).await;
        self.containers = containers;
        self.hydrate();
    }

    /// Replaces container contents with fresh server data; outstanding
    /// proposals are placed on top again.
    pub fn set_containers(&mut self, containers: SectionContainers) {
        self.containers = containers;
        self.hydrate();
    }

    pub fn containers(&self) -> &SectionContainers {
        &self.containers
    }

    pub fn pending_records(&self) -> &[OptimisticEntityRecord<PendingThought>] {
        self.store.records()
    }

    pub fn store(&self) -> &RecordStore<PendingThought> {
        &self.store
    }

    pub fn sync_state_by_id(&self) -> SyncStateById {
        self.store.sync_state_by_id()
    }

    pub async fn flush(&self) {
        self.store.flush().await;
    }

    fn hydrate(&mut self) {
        let records = self
            .store
            .records()
            .iter()
            .filter(|record| record.operation == EntityOperation::Create)
            .cloned()
            .collect::<Vec<_>>();

        for record in &records {
            let section = record.entity.section_id;
            if let Some(item) = self
                .containers
                .find_mut(|item| item.matches_local_id(&record.local_id))
            {
                item.mirror_record(record);
                continue;
            }
            let item = ThoughtItem::from_record(record);
            self.containers.remove_from_other_sections(&item.id, section);
            self.containers.insert_ordered(section, item);
        }

        if !records.is_empty() {
            event!(Level::DEBUG, hydrated = records.len(), "pending thoughts hydrated");
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Records a pending create and places its item. Returns `None` when the
    /// sermon is unresolved.
    pub fn create_pending_thought(&mut self, input: NewPendingThought) -> Option<ThoughtItem> {
        let local_id = self.store.context().ids.next_local_id(THOUGHT_ID_NAMESPACE);
        let span = info_span!(
            "sync.thought.create",
            local_id = %local_id,
            section = %input.section_id
        );
        let _enter = span.enter();

        let section = input.section_id;
        let thought = PendingThought {
            id: local_id.clone(),
            section_id: section,
            text: input.text,
            tags: input.tags,
            outline_point_id: input.outline_point_id,
        };
        let record = self.store.create_record_with_local_id(
            local_id.clone(),
            NewRecord::new(local_id, EntityOperation::Create, thought),
        )?;

        let item = ThoughtItem::from_record(&record);
        let stale = self.containers.remove_from_other_sections(&item.id, section);
        if stale > 0 {
            event!(Level::DEBUG, stale, "removed leaked duplicates from other sections");
        }
        let index = self.containers.insert_ordered(section, item.clone());
        event!(Level::DEBUG, index, "pending thought placed");
        Some(item)
    }

    /// Updates the proposal's status and mirrors it onto its item.
    pub fn mark_pending_status(
        &mut self,
        local_id: &str,
        status: SyncStatus,
        error: Option<String>,
    ) -> bool {
        let options = MarkStatusOptions {
            error,
            ..MarkStatusOptions::default()
        };
        if !self.store.mark_record_status(local_id, status, options) {
            return false;
        }
        if let Some(record) = self.store.get_record_by_local_id(local_id) {
            if let Some(item) = self
                .containers
                .find_mut(|item| item.matches_local_id(local_id))
            {
                item.mirror_record(record);
            }
        }
        true
    }

    /// Explicit user retry of a failed proposal: back to `pending` with a
    /// fresh TTL.
    pub fn retry_pending_thought(&mut self, local_id: &str) -> bool {
        self.mark_pending_status(local_id, SyncStatus::Pending, None)
    }

    /// Sets the item's display status; `None` clears every sync field.
    pub fn update_item_sync_status(
        &mut self,
        local_id: &str,
        status: Option<SyncStatus>,
        success_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(item) = self
            .containers
            .find_mut(|item| item.matches_local_id(local_id))
        else {
            return false;
        };

        match status {
            None => item.clear_sync_metadata(),
            Some(status) => {
                item.sync_status = Some(status);
                if status != SyncStatus::Error {
                    item.sync_last_error = None;
                }
                if let Some(at) = success_at {
                    item.sync_success_at = Some(at);
                }
            }
        }
        true
    }

    /// Swaps the optimistic item for the confirmed thought in the same
    /// position, marks it successful and retires the proposal.
    pub fn confirm_pending_thought(&mut self, local_id: &str, confirmed: ThoughtItem) -> bool {
        let now = self.store.context().clock.now();
        let Some(record) = self.store.get_record_by_local_id(local_id).cloned() else {
            return false;
        };

        let mut item = confirmed;
        item.local_id = Some(local_id.to_string());
        item.sync_status = Some(SyncStatus::Success);
        item.sync_operation = Some(record.operation);
        item.sync_last_error = None;
        item.sync_expires_at = None;
        item.sync_success_at = Some(now);

        let section = record.entity.section_id;
        let confirmed_id = item.id.clone();
        match self
            .containers
            .locate(|existing| existing.matches_local_id(local_id))
        {
            Some((held_in, index)) => {
                if let Some(slot) = self.containers.item_mut(held_in, index) {
                    *slot = item;
                }
                // A server refresh may already have rendered the confirmed id.
                self.containers.remove_where(|existing| {
                    existing.id == confirmed_id && !existing.matches_local_id(local_id)
                });
            }
            None => {
                self.containers
                    .remove_where(|existing| existing.id == confirmed_id);
                self.containers.insert_ordered(section, item);
            }
        }

        self.store.remove_record(local_id);
        event!(Level::DEBUG, local_id = %local_id, entity_id = %confirmed_id, "pending thought confirmed");
        true
    }

    /// Discards the proposal and its item.
    pub fn remove_pending_thought(&mut self, local_id: &str) -> bool {
        let record_removed = self.store.remove_record(local_id).is_some();
        let items_removed = !self
            .containers
            .remove_where(|item| item.matches_local_id(local_id))
            .is_empty();
        record_removed || items_removed
    }

    /// Purges expired proposals and drops their items.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> Vec<ExpiredProposal> {
        let expired = self.store.purge_expired_at(now);
        for proposal in &expired {
            if let Some((section, index)) = self
                .containers
                .locate(|item| item.matches_local_id(&proposal.local_id))
            {
                self.containers.remove_at(section, index);
            }
        }
        expired
    }
}

impl ExpiringStore for ThoughtSyncController {
    fn purge_expired(&mut self) -> Vec<ExpiredProposal> {
        let now = self.store.context().clock.now();
        self.purge_expired_at(now)
    }
}

impl std::fmt::Debug for ThoughtSyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThoughtSyncController")
            .field("store", &self.store)
            .field("items", &self.containers.len())
            .finish()
    }
}
