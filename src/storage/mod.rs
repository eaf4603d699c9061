pub mod file;
pub mod memory;
pub mod persistence;
pub mod writer;

pub use file::{FilePersistence, RecordCodec};
pub use memory::InMemoryPersistence;
pub use persistence::{RecordPersistence, decode_records, encode_records};
pub use writer::PersistenceWriter;
