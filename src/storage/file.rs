//! File-backed persistence: one queue file per `(entity type, scope id)`.

use super::persistence::RecordPersistence;
use crate::core::{Result, ScopeKey, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

const QUEUE_FORMAT_VERSION: u16 = 1;
const KEY_SEPARATOR: &str = "__";

/// On-disk encoding of a queue file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordCodec {
    #[default]
    Json,
    MessagePack,
}

impl RecordCodec {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    fn encode(self, file: &QueueFile) -> Result<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec_pretty(file)
                .map_err(|err| SyncError::Serialization(format!("serialize queue file: {}", err))),
            Self::MessagePack => rmp_serde::to_vec_named(file)
                .map_err(|err| SyncError::Serialization(format!("serialize queue file: {}", err))),
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<QueueFile> {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|err| SyncError::Serialization(format!("parse queue file: {}", err))),
            Self::MessagePack => rmp_serde::from_slice(bytes)
                .map_err(|err| SyncError::Serialization(format!("parse queue file: {}", err))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    format_version: u16,
    key: ScopeKey,
    records: Vec<serde_json::Value>,
}

/// Durable persistence rooted at a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root_dir: PathBuf,
    codec: RecordCodec,
}

impl FilePersistence {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            codec: RecordCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: RecordCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the queue file for one partition.
    pub fn queue_path(&self, key: &ScopeKey) -> PathBuf {
        let file_name = format!(
            "{}{}{}.{}",
            escape_component(&key.entity_type),
            KEY_SEPARATOR,
            escape_component(&key.scope_id),
            self.codec.extension()
        );
        self.root_dir.join(file_name)
    }

    fn key_from_file_name(&self, file_name: &str) -> Option<ScopeKey> {
        let stem = file_name.strip_suffix(&format!(".{}", self.codec.extension()))?;
        let (entity_type, scope_id) = stem.split_once(KEY_SEPARATOR)?;
        ScopeKey::new(
            unescape_component(entity_type)?,
            unescape_component(scope_id)?,
        )
        .ok()
    }
}

#[async_trait]
impl RecordPersistence for FilePersistence {
    async fn load_records(&self, key: &ScopeKey) -> Result<Vec<serde_json::Value>> {
        let path = self.queue_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SyncError::Io(format!("read {}: {}", path.display(), err))),
        };

        let file = self.codec.decode(&bytes)?;
        if file.format_version != QUEUE_FORMAT_VERSION {
            return Err(SyncError::Persistence(format!(
                "Unsupported queue file format version {}",
                file.format_version
            )));
        }
        if &file.key != key {
            return Err(SyncError::Persistence(format!(
                "queue file {} belongs to '{}', expected '{}'",
                path.display(),
                file.key,
                key
            )));
        }
        Ok(file.records)
    }

    async fn save_records(&self, key: &ScopeKey, records: Vec<serde_json::Value>) -> Result<()> {
        let path = self.queue_path(key);

        if records.is_empty() {
            return match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(SyncError::Io(format!("remove {}: {}", path.display(), err))),
            };
        }

        let bytes = self.codec.encode(&QueueFile {
            format_version: QUEUE_FORMAT_VERSION,
            key: key.clone(),
            records,
        })?;

        fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|err| SyncError::Io(format!("create {}: {}", self.root_dir.display(), err)))?;

        let root_dir = self.root_dir.clone();
        tokio::task::spawn_blocking(move || write_atomically(&root_dir, &path, &bytes))
            .await
            .map_err(|err| SyncError::Io(format!("queue writer join: {}", err)))?
    }

    async fn list_scopes(&self) -> Result<Vec<ScopeKey>> {
        let mut entries = match fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(SyncError::Io(format!(
                    "read dir {}: {}",
                    self.root_dir.display(),
                    err
                )));
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.key_from_file_name(name))
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Writes to a temp file in the same directory and renames it into place.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|err| SyncError::Io(format!("persist {}: {}", path.display(), err.error)))?;
    Ok(())
}

/// Keeps `[A-Za-z0-9-]` and hex-escapes everything else as `%XX`, so the
/// `__` separator can never appear inside a component.
fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

fn unescape_component(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
