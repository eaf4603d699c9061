//! Optimistic "thought" entries placed by section and outline point.

pub mod containers;
pub mod controller;
pub mod model;

pub use containers::SectionContainers;
pub use controller::ThoughtSyncController;
pub use model::{NewPendingThought, PendingThought, SermonSection, THOUGHT_ENTITY_TYPE, ThoughtItem};
