//! Recovery and rotation.
//!
//! Three ways a user ends up with a sealed key on this device:
//! - `enroll`: first run, nothing to lose
//! - `restore`: the user pastes their archived recovery material
//! - `regenerate`: nothing can be recovered; a fresh pair replaces the old
//!   one and every message encrypted to the old pair becomes unreadable
//!
//! New material is surfaced through a [`RecoveryHandshake`] so the one-time
//! display and the user's acknowledgement are explicit states rather than
//! flags scattered across the UI.

use tracing::{info, warn};

use veil_crypto::{KeyPair, PrivateKey, PublicKeyBytes};
use veil_proto::UserDirectory;

use crate::{
    error::StoreError,
    keystore::{LocalKeyStore, RecoveryMaterial},
};

/// Proof that the user explicitly agreed to a destructive key regeneration.
/// The core never prompts; the caller builds this after its own dialog.
#[derive(Debug)]
pub struct RegenerationConfirmation {
    _private: (),
}

impl RegenerationConfirmation {
    pub fn user_confirmed() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    KeyGenerated,
    AwaitingConfirmation,
    Confirmed,
}

/// KeyGenerated → AwaitingConfirmation → Confirmed.
///
/// `present` may be called again while awaiting confirmation (copy and
/// download both need the text). `confirm` wipes the material.
#[derive(Debug)]
pub struct RecoveryHandshake {
    phase: RecoveryPhase,
    material: Option<RecoveryMaterial>,
    public_key: PublicKeyBytes,
}

impl RecoveryHandshake {
    fn new(material: RecoveryMaterial, public_key: PublicKeyBytes) -> Self {
        Self {
            phase: RecoveryPhase::KeyGenerated,
            material: Some(material),
            public_key,
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    pub fn public_key(&self) -> &PublicKeyBytes {
        &self.public_key
    }

    /// Hand the recovery material to the display surface.
    pub fn present(&mut self) -> Result<&str, StoreError> {
        match self.phase {
            RecoveryPhase::KeyGenerated | RecoveryPhase::AwaitingConfirmation => {
                self.phase = RecoveryPhase::AwaitingConfirmation;
                self.material
                    .as_ref()
                    .map(RecoveryMaterial::expose)
                    .ok_or_else(|| StoreError::Handshake("recovery material already wiped".into()))
            }
            RecoveryPhase::Confirmed => Err(StoreError::Handshake(
                "recovery material was already confirmed and wiped".into(),
            )),
        }
    }

    /// The user has archived the material.
    pub fn confirm(&mut self) -> Result<(), StoreError> {
        match self.phase {
            RecoveryPhase::AwaitingConfirmation => {
                self.material = None;
                self.phase = RecoveryPhase::Confirmed;
                Ok(())
            }
            RecoveryPhase::KeyGenerated => Err(StoreError::Handshake(
                "cannot confirm before the material was presented".into(),
            )),
            RecoveryPhase::Confirmed => Err(StoreError::Handshake("already confirmed".into())),
        }
    }
}

/// Result of enrolment or regeneration: the new pair, already sealed and
/// persisted, plus the handshake for the one-time display.
#[derive(Debug)]
pub struct ProvisionedKeys {
    pub key_pair: KeyPair,
    pub handshake: RecoveryHandshake,
}

impl ProvisionedKeys {
    pub fn public_key(&self) -> PublicKeyBytes {
        self.key_pair.public
    }

    /// Publish the new public key. Until this runs, peers keep encrypting to
    /// the old key (or cannot reach the user at all).
    pub async fn publish(&self, directory: &dyn UserDirectory, user_id: &str) -> Result<(), StoreError> {
        directory.set_public_key(user_id, self.key_pair.public).await?;
        info!(
            user_id = %user_id,
            fingerprint = %self.key_pair.public.fingerprint(),
            "public key published"
        );
        Ok(())
    }
}

pub struct RecoveryManager {
    keystore: LocalKeyStore,
}

impl RecoveryManager {
    pub fn new(keystore: LocalKeyStore) -> Self {
        Self { keystore }
    }

    pub fn keystore(&self) -> &LocalKeyStore {
        &self.keystore
    }

    async fn provision(&self, user_id: &str, password: &str) -> Result<ProvisionedKeys, StoreError> {
        let key_pair = KeyPair::generate();
        let material = self.keystore.store(user_id, &key_pair.private, password).await?;
        let handshake = RecoveryHandshake::new(material, key_pair.public);
        Ok(ProvisionedKeys { key_pair, handshake })
    }

    /// First-run key creation. Refuses to overwrite an existing sealed key;
    /// replacing one is `regenerate`'s job.
    pub async fn enroll(&self, user_id: &str, password: &str) -> Result<ProvisionedKeys, StoreError> {
        if self.keystore.has_sealed_key(user_id).await? {
            return Err(StoreError::InvalidInput(format!(
                "user {user_id} already has a sealed key on this device"
            )));
        }
        let keys = self.provision(user_id, password).await?;
        info!(user_id = %user_id, fingerprint = %keys.public_key().fingerprint(), "account enrolled");
        Ok(keys)
    }

    /// Re-seal archived recovery material under `password`.
    ///
    /// The candidate must decode to a private key of the right length and
    /// its derived public key must equal `expected_public_key`. Storage is
    /// untouched on any rejection.
    pub async fn try_restore(
        &self,
        user_id: &str,
        candidate: &str,
        password: &str,
        expected_public_key: &PublicKeyBytes,
    ) -> Result<(), StoreError> {
        let candidate = KeyPair::from_private(PrivateKey::from_b64(candidate)?);
        if candidate.public != *expected_public_key {
            return Err(StoreError::KeyMismatch);
        }
        self.keystore.store(user_id, &candidate.private, password).await?;
        info!(user_id = %user_id, "private key restored from recovery material");
        Ok(())
    }

    pub async fn restore(
        &self,
        user_id: &str,
        candidate: &str,
        password: &str,
        expected_public_key: &PublicKeyBytes,
    ) -> bool {
        match self.try_restore(user_id, candidate, password, expected_public_key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(user_id = %user_id, "restore rejected: {err}");
                false
            }
        }
    }

    /// Replace the user's key pair. Nothing encrypted to the old pair is
    /// migrated; that history is permanently unreadable afterwards. The
    /// caller must publish the returned public key.
    pub async fn regenerate(
        &self,
        user_id: &str,
        password: &str,
        _confirmation: RegenerationConfirmation,
    ) -> Result<ProvisionedKeys, StoreError> {
        let keys = self.provision(user_id, password).await?;
        warn!(
            user_id = %user_id,
            fingerprint = %keys.public_key().fingerprint(),
            "key pair regenerated; history encrypted to the previous key is lost"
        );
        Ok(keys)
    }
}
