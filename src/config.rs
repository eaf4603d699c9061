use crate::core::{CreatePlacement, Result, SyncError};
use crate::storage::RecordCodec;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_millis(1_000);
/// Longest accepted proposal lifetime.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const ENV_TTL_MS: &str = "OPTIMISTIC_SYNC_TTL_MS";
const ENV_EXPIRY_INTERVAL_MS: &str = "OPTIMISTIC_SYNC_EXPIRY_INTERVAL_MS";
const ENV_STORAGE_DIR: &str = "OPTIMISTIC_SYNC_STORAGE_DIR";
const ENV_CREATE_PLACEMENT: &str = "OPTIMISTIC_SYNC_CREATE_PLACEMENT";

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Lifetime of an unresolved proposal
    pub ttl: Duration,

    /// How often the expiry monitor scans for expired proposals
    pub expiry_check_interval: Duration,

    /// Where projected creates land when the entity is not in the base list
    pub create_placement: CreatePlacement,

    /// Directory used by file-backed persistence
    pub storage_dir: Option<PathBuf>,

    /// On-disk encoding for file-backed persistence
    pub codec: RecordCodec,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            expiry_check_interval: DEFAULT_EXPIRY_CHECK_INTERVAL,
            create_placement: CreatePlacement::default(),
            storage_dir: None,
            codec: RecordCodec::default(),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set proposal time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set expiry scan interval
    pub fn expiry_check_interval(mut self, interval: Duration) -> Self {
        self.expiry_check_interval = interval;
        self
    }

    /// Set create placement
    pub fn create_placement(mut self, placement: CreatePlacement) -> Self {
        self.create_placement = placement;
        self
    }

    /// Set storage directory
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Set on-disk codec
    pub fn codec(mut self, codec: RecordCodec) -> Self {
        self.codec = codec;
        self
    }

    /// TTL as a chrono duration for timestamp arithmetic.
    pub fn ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(SyncError::Config("ttl must be greater than zero".to_string()));
        }
        if self.ttl > MAX_TTL {
            return Err(SyncError::Config(format!(
                "ttl must not exceed {} days",
                MAX_TTL.as_secs() / 86_400
            )));
        }
        if self.expiry_check_interval.is_zero() {
            return Err(SyncError::Config(
                "expiry_check_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `OPTIMISTIC_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TTL_MS) {
            config.ttl = Duration::from_millis(parse_millis(ENV_TTL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_EXPIRY_INTERVAL_MS) {
            config.expiry_check_interval =
                Duration::from_millis(parse_millis(ENV_EXPIRY_INTERVAL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_STORAGE_DIR) {
            if !raw.trim().is_empty() {
                config.storage_dir = Some(PathBuf::from(raw));
            }
        }
        if let Some(raw) = lookup(ENV_CREATE_PLACEMENT) {
            config.create_placement = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| SyncError::Config(format!("{} must be an integer: {}", key, e)))
}
