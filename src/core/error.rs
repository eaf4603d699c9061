use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Proposal '{local_id}' for entity '{entity_id}' expired before it was confirmed")]
    Expired { local_id: String, entity_id: String },

    #[error("Expiry monitor join error: {0}")]
    MonitorJoin(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
