use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// Key-store configuration, persisted as `settings.json`. Every field has a
/// default so older or partial files still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Where sealed key records live. `None` means the platform default.
    pub data_dir: Option<PathBuf>,
    /// Prefix of every storage key.
    pub namespace: String,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Run PBKDF2 on a blocking worker instead of the calling task.
    pub offload_kdf: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            namespace: "veil".into(),
            log_filter: "info".into(),
            offload_kdf: true,
        }
    }
}

impl StoreSettings {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_default() -> anyhow::Result<Self> {
        Self::load(&paths::settings_path()?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Directory for sealed key records.
    pub fn resolved_data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::keys_dir(),
        }
    }
}
