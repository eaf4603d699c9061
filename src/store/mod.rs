pub mod context;
pub mod record_store;

pub use context::SyncContext;
pub use record_store::{
    MarkStatusOptions, NewRecord, RESUMED_SENDING_ERROR, RecordStore, ReplaceEntityOptions,
};
