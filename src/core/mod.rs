pub mod clock;
pub mod error;
pub mod ids;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SyncError};
pub use ids::{IdGenerator, RECORD_ID_NAMESPACE, SequentialIdGenerator, THOUGHT_ID_NAMESPACE, UuidIdGenerator};
pub use types::{
    CreatePlacement, EntityOperation, OptimisticEntityRecord, ScopeKey, SyncEntity, SyncStatus,
};
