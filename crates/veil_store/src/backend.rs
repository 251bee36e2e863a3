//! Backends holding sealed key records.
//!
//! Values are opaque strings (base64 sealed records). One writer per device
//! is assumed, so the only consistency guarantee needed is that a write
//! replaces the old value atomically.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;

#[async_trait]
pub trait KeyStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ── File backend ──────────────────────────────────────────────────────────────

/// One file per storage key inside `dir`. File names are the hex of the
/// storage key, so any user id is a safe path component.
#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    dir: PathBuf,
}

impl FileKeyStorage {
    /// Open (or create) the key directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.sealed", hex::encode(key.as_bytes())))
    }
}

#[async_trait]
impl KeyStorage for FileKeyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        let value = value.to_string();
        // Write to a temp file in the same directory, then rename over the
        // target. tempfile creates the file owner-only (0600) on unix.
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Memory backend ────────────────────────────────────────────────────────────

/// Process-local backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStorage for MemoryKeyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_backend_put_get_replace_delete() {
        let dir = tempdir().unwrap();
        let storage = FileKeyStorage::open(dir.path().join("keys")).await.unwrap();

        assert_eq!(storage.get("veil.sealed_private_key.alice").await.unwrap(), None);
        storage.put("veil.sealed_private_key.alice", "first").await.unwrap();
        storage.put("veil.sealed_private_key.alice", "second").await.unwrap();
        assert_eq!(
            storage.get("veil.sealed_private_key.alice").await.unwrap().as_deref(),
            Some("second")
        );

        // Only the target file remains; temp files were renamed away.
        let entries = std::fs::read_dir(storage.dir()).unwrap().count();
        assert_eq!(entries, 1);

        storage.delete("veil.sealed_private_key.alice").await.unwrap();
        storage.delete("veil.sealed_private_key.alice").await.unwrap();
        assert_eq!(storage.get("veil.sealed_private_key.alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_backend_accepts_hostile_user_ids() {
        let dir = tempdir().unwrap();
        let storage = FileKeyStorage::open(dir.path()).await.unwrap();
        storage.put("ns.key.../../etc/passwd", "v").await.unwrap();
        assert_eq!(storage.get("ns.key.../../etc/passwd").await.unwrap().as_deref(), Some("v"));
        assert!(std::fs::read_dir(dir.path()).unwrap().all(|e| {
            e.unwrap().path().parent() == Some(dir.path())
        }));
    }
}
