//! User directory: the published public key of every account.
//!
//! A missing entry means "participant key unresolved"; the core refuses to
//! encrypt for, or decrypt from, such a participant.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use veil_crypto::PublicKeyBytes;

use crate::error::ProtoError;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<PublicKeyBytes>, ProtoError>;

    async fn set_public_key(&self, user_id: &str, key: PublicKeyBytes) -> Result<(), ProtoError>;
}

/// Look up every participant. Unresolved ids map to `None`; whether that is
/// fatal is the caller's decision (fatal for sending, not for reading).
pub async fn resolve_participants(
    directory: &dyn UserDirectory,
    participant_ids: &[String],
) -> Result<BTreeMap<String, Option<PublicKeyBytes>>, ProtoError> {
    let mut keys = BTreeMap::new();
    for user_id in participant_ids {
        let key = directory.get_public_key(user_id).await?;
        if key.is_none() {
            tracing::debug!(user_id = %user_id, "no public key in directory");
        }
        keys.insert(user_id.clone(), key);
    }
    Ok(keys)
}

/// In-process directory for tests and single-device setups.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<String, PublicKeyBytes>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<PublicKeyBytes>, ProtoError> {
        Ok(self.entries.read().get(user_id).copied())
    }

    async fn set_public_key(&self, user_id: &str, key: PublicKeyBytes) -> Result<(), ProtoError> {
        self.entries.write().insert(user_id.to_string(), key);
        Ok(())
    }
}
