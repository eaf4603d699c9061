//! Everything an application needs to drive optimistic proposals.

pub use crate::{
    ChannelNotifier, CreatePlacement, EntityOperation, ExpiredProposal, ExpiryNotifier,
    MarkStatusOptions, NewRecord, OptimisticEntityRecord, OptimisticSyncState, ProjectionOptions,
    RecordStore, ReplaceEntityOptions, SyncConfig, SyncContext, SyncEntity, SyncSession,
    SyncStatus, project_optimistic_entities,
};

pub mod thoughts {
    //! Section/outline-aware thought entries.
    pub use crate::thoughts::{
        NewPendingThought, SectionContainers, SermonSection, ThoughtItem, ThoughtSyncController,
    };
}
