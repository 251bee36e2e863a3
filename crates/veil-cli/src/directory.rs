//! User directory kept as a JSON file (`user id → base64 public key`).
//! Stands in for the server-side directory on a single machine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use veil_crypto::PublicKeyBytes;
use veil_proto::{ProtoError, UserDirectory};

type Entries = BTreeMap<String, PublicKeyBytes>;

pub struct JsonFileDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Entries, ProtoError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(ProtoError::Directory(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[async_trait]
impl UserDirectory for JsonFileDirectory {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<PublicKeyBytes>, ProtoError> {
        Ok(self.load().await?.get(user_id).copied())
    }

    async fn set_public_key(&self, user_id: &str, key: PublicKeyBytes) -> Result<(), ProtoError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(user_id.to_string(), key);

        let io_err = |e: std::io::Error| ProtoError::Directory(format!("{}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)
            .await
            .map_err(io_err)?;
        Ok(())
    }
}
