//! Attachment byte storage.
//!
//! Ticket state only records attachment metadata; the bytes live behind an
//! [`AttachmentStore`] keyed by `storage_key` (`{ticket_id}/{uuid}`).

use crate::types::TicketId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors from an attachment store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key does not map to a path inside the store
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Filesystem failure
    #[error("Attachment storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Key for a new upload to `ticket_id`
#[must_use]
pub fn storage_key(ticket_id: TicketId, upload_id: Uuid) -> String {
    format!("{ticket_id}/{upload_id}")
}

/// Where attachment bytes are kept
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous content.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Files under a root directory
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
}

impl LocalAttachmentStore {
    /// Store files below `root`; directories are created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        tracing::debug!(key, size = bytes.len(), "Stored attachment");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryAttachmentStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` holds bytes
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of stored files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("supportdesk-attachments-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn local_store_writes_and_deletes() {
        let root = scratch_dir();
        let store = LocalAttachmentStore::new(&root);
        let key = storage_key(TicketId::from_uuid(Uuid::new_v4()), Uuid::new_v4());

        store.put(&key, b"log output").await.unwrap();
        assert_eq!(fs::read(root.join(&key)).await.unwrap(), b"log output");

        store.delete(&key).await.unwrap();
        assert!(!root.join(&key).exists());
        store.delete(&key).await.unwrap();

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let store = LocalAttachmentStore::new(scratch_dir());
        assert!(matches!(
            store.put("../outside", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.delete("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_store_tracks_keys() {
        let store = InMemoryAttachmentStore::new();
        store.put("a/b", b"1").await.unwrap();
        assert!(store.contains("a/b"));
        store.delete("a/b").await.unwrap();
        assert!(store.is_empty());
    }
}
