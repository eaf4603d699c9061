use crate::config::SyncConfig;
use crate::core::{Clock, IdGenerator, Result, SystemClock, UuidIdGenerator};
use crate::storage::{FilePersistence, InMemoryPersistence, RecordPersistence};
use std::sync::Arc;

/// Collaborators shared by every store of one session.
///
/// Each store is still an independent instance keyed by
/// `(entity type, scope id)`; the context only carries injected capabilities.
#[derive(Clone)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub persistence: Arc<dyn RecordPersistence>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl SyncContext {
    pub fn new(persistence: Arc<dyn RecordPersistence>) -> Self {
        Self {
            config: SyncConfig::default(),
            persistence,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
        }
    }

    /// Ephemeral context: nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPersistence::new()))
    }

    /// File-backed context built from `config.storage_dir`.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let persistence: Arc<dyn RecordPersistence> = match &config.storage_dir {
            Some(dir) => Arc::new(FilePersistence::new(dir.clone()).with_codec(config.codec)),
            None => Arc::new(InMemoryPersistence::new()),
        };
        Ok(Self {
            config,
            persistence,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
        })
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
