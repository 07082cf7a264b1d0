//! Durable storage for the active context key.
//!
//! Only one string per slot is ever stored: the identity key of the
//! context the user last switched to. Writes are last-writer-wins.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Slot holding the active context key.
pub const ACTIVE_CONTEXT_SLOT: &str = "active_context_id";

/// Slot name for a user, or the shared slot when namespacing is off.
pub fn active_context_slot(user_id: Option<&str>, per_user: bool) -> String {
    match user_id {
        Some(id) if per_user && !id.is_empty() => format!("{}:{}", ACTIVE_CONTEXT_SLOT, id),
        _ => ACTIVE_CONTEXT_SLOT.to_string(),
    }
}

/// Key/value storage that survives restarts.
#[async_trait]
pub trait ContextKeyStorage: Send + Sync {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError>;
    async fn save(&self, slot: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

/// Errors from key storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(String),
}

/// Keys kept in a single JSON object on disk.
pub struct FileKeyStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the file contents via a temp file + rename.
    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read-modify-write under the file lock.
    ///
    /// A corrupt file is logged and replaced rather than wedging every save.
    async fn update<F>(&self, edit: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.lock.lock().await;
        let mut entries = match self.read_all().await {
            Ok(entries) => entries,
            Err(StorageError::Corrupt(reason)) => {
                tracing::warn!(reason = %reason, "Discarding corrupt context key file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        edit(&mut entries);
        self.write_all(&entries).await
    }
}

#[async_trait]
impl ContextKeyStorage for FileKeyStorage {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(slot))
    }

    async fn save(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(slot.to_string(), value.to_string());
        })
        .await
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(slot);
        })
        .await
    }
}

/// Process-local storage, lost on restart.
#[derive(Default)]
pub struct MemoryKeyStorage {
    entries: DashMap<String, String>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextKeyStorage for MemoryKeyStorage {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(slot).map(|v| v.clone()))
    }

    async fn save(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.entries.remove(slot);
        Ok(())
    }
}
