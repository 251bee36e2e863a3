//! Local key store: sealed private key per user, fronted by the cache.
//!
//! Only sealed records reach the storage backend. The cleartext key exists
//! in the cache and transiently in callers.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use veil_crypto::{sealed, PrivateKey, SealedKeyRecord};

use crate::{
    backend::KeyStorage, cache::DecryptedKeyCache, error::StoreError, settings::StoreSettings,
};

const SEALED_KEY_PREFIX: &str = "sealed_private_key";

/// The raw base64 private key, shown to the user once so they can archive
/// it. Losing it is unrecoverable.
pub struct RecoveryMaterial(Zeroizing<String>);

impl RecoveryMaterial {
    pub(crate) fn from_key(key: &PrivateKey) -> Self {
        Self(key.to_b64())
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for RecoveryMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryMaterial(<redacted>)")
    }
}

/// Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct LocalKeyStore {
    storage: Arc<dyn KeyStorage>,
    cache: Arc<DecryptedKeyCache>,
    namespace: String,
    offload_kdf: bool,
}

impl LocalKeyStore {
    pub fn new(storage: Arc<dyn KeyStorage>, cache: Arc<DecryptedKeyCache>) -> Self {
        Self::with_settings(storage, cache, &StoreSettings::default())
    }

    pub fn with_settings(
        storage: Arc<dyn KeyStorage>,
        cache: Arc<DecryptedKeyCache>,
        settings: &StoreSettings,
    ) -> Self {
        Self {
            storage,
            cache,
            namespace: settings.namespace.clone(),
            offload_kdf: settings.offload_kdf,
        }
    }

    pub fn cache(&self) -> &Arc<DecryptedKeyCache> {
        &self.cache
    }

    fn storage_key(&self, user_id: &str) -> String {
        format!("{}.{SEALED_KEY_PREFIX}.{user_id}", self.namespace)
    }

    /// Run a password derivation, on a blocking worker when configured so
    /// the ~100 ms KDF does not stall the async executor.
    async fn run_kdf<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.offload_kdf {
            tokio::task::spawn_blocking(f)
                .await
                .map_err(|e| StoreError::Task(e.to_string()))
        } else {
            Ok(f())
        }
    }

    /// Seal and persist `private_key` under `password`, replacing any
    /// previous record. Every cached key for the user is purged and the new
    /// one cached. Returns the one-time recovery material.
    pub async fn store(
        &self,
        user_id: &str,
        private_key: &PrivateKey,
        password: &str,
    ) -> Result<RecoveryMaterial, StoreError> {
        let key = private_key.clone();
        let pw = Zeroizing::new(password.to_string());
        let record = self.run_kdf(move || sealed::seal(&key, &pw)).await??;

        self.storage
            .put(&self.storage_key(user_id), &record.to_b64())
            .await?;
        self.cache.clear(user_id);
        self.cache.insert(user_id, password, private_key.clone());
        info!(user_id = %user_id, "sealed private key stored");
        Ok(RecoveryMaterial::from_key(private_key))
    }

    /// Cache first, then storage. Reports exactly why the key could not be
    /// produced.
    pub async fn try_retrieve(&self, user_id: &str, password: &str) -> Result<PrivateKey, StoreError> {
        if let Some(key) = self.cache.get(user_id, password) {
            return Ok(key);
        }

        // Noted before the read: a store or remove that lands while the
        // KDF runs bumps it, and the stale key is then not cached.
        let generation = self.cache.generation(user_id);
        let stored = self
            .storage
            .get(&self.storage_key(user_id))
            .await?
            .ok_or_else(|| StoreError::KeyNotFound(user_id.to_string()))?;
        let record = SealedKeyRecord::from_b64(&stored)?;

        let pw = Zeroizing::new(password.to_string());
        let key = self.run_kdf(move || sealed::unseal(&record, &pw)).await??;
        if self.cache.insert_if_current(user_id, password, generation, key.clone()) {
            debug!(user_id = %user_id, "private key unsealed and cached");
        } else {
            debug!(user_id = %user_id, "key record replaced during unseal; not cached");
        }
        Ok(key)
    }

    /// `None` on any failure. With `silent` the failure is an expected
    /// probe outcome and only logged at debug level.
    pub async fn retrieve(&self, user_id: &str, password: &str, silent: bool) -> Option<PrivateKey> {
        match self.try_retrieve(user_id, password).await {
            Ok(key) => Some(key),
            Err(err) if silent => {
                debug!(user_id = %user_id, "private key probe failed: {err}");
                None
            }
            Err(err) => {
                warn!(user_id = %user_id, "private key retrieval failed: {err}");
                None
            }
        }
    }

    /// Whether a sealed record exists, without touching the password.
    pub async fn has_sealed_key(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.storage.get(&self.storage_key(user_id)).await?.is_some())
    }

    /// Delete the sealed record and purge every cached key for the user.
    pub async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        self.storage.delete(&self.storage_key(user_id)).await?;
        let purged = self.cache.clear(user_id);
        info!(user_id = %user_id, purged, "sealed private key removed");
        Ok(())
    }
}
