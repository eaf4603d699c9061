//! Pure projection functions: no I/O, no clock, no mutation of inputs.

pub mod project;
pub mod sync_state;

pub use project::{
    ProjectionOptions, ProjectionReport, RejectedProposal, RejectionReason, is_stale,
    project_optimistic_entities, project_with_report,
};
pub use sync_state::{OptimisticSyncState, SyncStateById, build_optimistic_sync_state_by_id};
