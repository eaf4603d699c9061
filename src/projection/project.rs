//! Merge of confirmed base state with the proposal queue.

use crate::core::{CreatePlacement, EntityOperation, OptimisticEntityRecord, SyncEntity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectionOptions {
    /// Defaults to [`CreatePlacement::End`].
    pub create_placement: CreatePlacement,
}

impl ProjectionOptions {
    pub fn new(create_placement: CreatePlacement) -> Self {
        Self { create_placement }
    }
}

/// Why a proposal had no effect on the projected list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    /// The confirmed entity carries a newer version than the proposal.
    StaleVersion,
    /// Update or delete against an id that is not in the list.
    TargetMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedProposal {
    pub local_id: String,
    pub entity_id: String,
    pub operation: EntityOperation,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionReport<T> {
    pub entities: Vec<T>,
    pub rejected: Vec<RejectedProposal>,
}

/// Replays `records` in order on top of `base` and returns the list to render.
pub fn project_optimistic_entities<T: SyncEntity>(
    base: &[T],
    records: &[OptimisticEntityRecord<T>],
    options: ProjectionOptions,
) -> Vec<T> {
    project_with_report(base, records, options).entities
}

/// Same as [`project_optimistic_entities`], also listing proposals that were
/// ignored and why.
pub fn project_with_report<T: SyncEntity>(
    base: &[T],
    records: &[OptimisticEntityRecord<T>],
    options: ProjectionOptions,
) -> ProjectionReport<T> {
    let mut entities = base.to_vec();
    let mut rejected = Vec::new();

    for record in records {
        let position = entities
            .iter()
            .position(|entity| entity.entity_id() == record.entity_id);

        let outcome = match (record.operation, position) {
            (EntityOperation::Delete, Some(_)) => {
                entities.retain(|entity| entity.entity_id() != record.entity_id);
                Ok(())
            }
            (EntityOperation::Delete, None) | (EntityOperation::Update, None) => {
                Err(RejectionReason::TargetMissing)
            }
            (EntityOperation::Update, Some(index)) | (EntityOperation::Create, Some(index)) => {
                replace_unless_stale(&mut entities[index], &record.entity)
            }
            (EntityOperation::Create, None) => {
                match options.create_placement {
                    CreatePlacement::Start => entities.insert(0, record.entity.clone()),
                    CreatePlacement::End => entities.push(record.entity.clone()),
                }
                Ok(())
            }
        };

        if let Err(reason) = outcome {
            rejected.push(RejectedProposal {
                local_id: record.local_id.clone(),
                entity_id: record.entity_id.clone(),
                operation: record.operation,
                reason,
            });
        }
    }

    dedupe_by_id(&mut entities);
    ProjectionReport { entities, rejected }
}

/// Only engages when both sides expose a version.
pub fn is_stale<T: SyncEntity>(existing: &T, proposed: &T) -> bool {
    match (existing.version(), proposed.version()) {
        (Some(current), Some(candidate)) => candidate < current,
        _ => false,
    }
}

fn replace_unless_stale<T: SyncEntity>(
    slot: &mut T,
    proposed: &T,
) -> std::result::Result<(), RejectionReason> {
    if is_stale(slot, proposed) {
        return Err(RejectionReason::StaleVersion);
    }
    *slot = proposed.clone();
    Ok(())
}

// A proposal whose entity carries a different id than its target can collide
// with another row; the earlier row keeps its place. Rows without an id are
// never collapsed.
fn dedupe_by_id<T: SyncEntity>(entities: &mut Vec<T>) {
    let mut seen = HashSet::with_capacity(entities.len());
    entities.retain(|entity| {
        let id = entity.entity_id();
        id.is_empty() || seen.insert(id.into_owned())
    });
}
