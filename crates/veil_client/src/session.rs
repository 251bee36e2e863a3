//! Per-user session.
//!
//! Holds the unlocked private key for the lifetime of a sign-in. Every
//! operation that needs the key fails with `SessionError::Locked` until
//! `unlock`, `enroll`, `restore` or `regenerate` has succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use veil_crypto::{message::encrypt_for_all_participants, PrivateKey, PublicKeyBytes};
use veil_proto::{directory::resolve_participants, MessageFeed, MessageRecord, UserDirectory};
use veil_store::{
    LocalKeyStore, RecoveryHandshake, RecoveryManager, RegenerationConfirmation,
};

use crate::{
    error::SessionError,
    pipeline::{PipelineContext, Subscription},
};

pub struct Session {
    user_id: String,
    recovery: RecoveryManager,
    directory: Arc<dyn UserDirectory>,
    feed: Arc<dyn MessageFeed>,
    private_key: RwLock<Option<PrivateKey>>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        keystore: LocalKeyStore,
        directory: Arc<dyn UserDirectory>,
        feed: Arc<dyn MessageFeed>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            recovery: RecoveryManager::new(keystore),
            directory,
            feed,
            private_key: RwLock::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn keystore(&self) -> &LocalKeyStore {
        self.recovery.keystore()
    }

    pub fn is_unlocked(&self) -> bool {
        self.private_key.read().is_some()
    }

    /// Public half of the unlocked key.
    pub fn public_key(&self) -> Option<PublicKeyBytes> {
        self.private_key.read().as_ref().map(PrivateKey::public_key)
    }

    fn private_key(&self) -> Result<PrivateKey, SessionError> {
        self.private_key.read().clone().ok_or(SessionError::Locked)
    }

    fn set_private_key(&self, key: PrivateKey) {
        *self.private_key.write() = Some(key);
    }

    /// Unseal the local key. On failure the caller should check
    /// `SessionError::requires_recovery` and offer restore or regenerate.
    pub async fn unlock(&self, password: &str) -> Result<(), SessionError> {
        let key = self.keystore().try_retrieve(&self.user_id, password).await?;

        // A local key that no longer pairs with the published one means
        // this device missed a regeneration elsewhere.
        if let Some(published) = self.directory.get_public_key(&self.user_id).await? {
            if published != key.public_key() {
                warn!(user_id = %self.user_id, "local key does not match the published public key");
            }
        }

        self.set_private_key(key);
        info!(user_id = %self.user_id, "session unlocked");
        Ok(())
    }

    /// First-run key creation: generate, seal, publish. The handshake holds
    /// the one-time recovery material.
    pub async fn enroll(&self, password: &str) -> Result<RecoveryHandshake, SessionError> {
        let keys = self.recovery.enroll(&self.user_id, password).await?;
        keys.publish(self.directory.as_ref(), &self.user_id).await?;
        self.set_private_key(keys.key_pair.private.clone());
        Ok(keys.handshake)
    }

    /// Restore from archived recovery material, checked against the
    /// account's published public key.
    pub async fn restore(&self, candidate: &str, password: &str) -> Result<(), SessionError> {
        let expected = self
            .directory
            .get_public_key(&self.user_id)
            .await?
            .ok_or_else(|| SessionError::NoPublishedKey(self.user_id.clone()))?;
        self.recovery
            .try_restore(&self.user_id, candidate, password, &expected)
            .await?;
        let key = self.keystore().try_retrieve(&self.user_id, password).await?;
        self.set_private_key(key);
        Ok(())
    }

    /// Destructive: replaces the key pair and publishes the new public key.
    /// History encrypted to the old pair becomes unreadable.
    pub async fn regenerate(
        &self,
        password: &str,
        confirmation: RegenerationConfirmation,
    ) -> Result<RecoveryHandshake, SessionError> {
        let keys = self
            .recovery
            .regenerate(&self.user_id, password, confirmation)
            .await?;
        keys.publish(self.directory.as_ref(), &self.user_id).await?;
        self.set_private_key(keys.key_pair.private.clone());
        Ok(keys.handshake)
    }

    /// Encrypt `plaintext` for every participant (this user included) and
    /// hand the record to the feed. One participant without a published
    /// key aborts the send before anything is written.
    pub async fn send(
        &self,
        conversation_id: &str,
        participant_ids: &[String],
        plaintext: &str,
    ) -> Result<MessageRecord, SessionError> {
        let private_key = self.private_key()?;
        let keys = resolve_participants(self.directory.as_ref(), participant_ids).await?;
        let envelopes = encrypt_for_all_participants(plaintext, &keys, &self.user_id, &private_key)?;

        let record = MessageRecord::new(conversation_id, &self.user_id, envelopes);
        self.feed.publish(record.clone()).await?;
        info!(
            conversation_id = %conversation_id,
            record_id = %record.id,
            recipients = record.per_recipient_envelopes.len(),
            "message sent"
        );
        Ok(record)
    }

    /// Start a live decryption pipeline over a conversation. Participant
    /// keys are resolved once; unresolved participants simply cannot be
    /// read from.
    pub async fn subscribe(
        &self,
        conversation_id: &str,
        participant_ids: &[String],
    ) -> Result<Subscription, SessionError> {
        let private_key = self.private_key()?;
        let participants: HashMap<_, _> = resolve_participants(self.directory.as_ref(), participant_ids)
            .await?
            .into_iter()
            .filter_map(|(user_id, key)| key.map(|key| (user_id, key)))
            .collect();

        info!(
            conversation_id = %conversation_id,
            readable_senders = participants.len(),
            "subscribed"
        );
        let ctx = PipelineContext {
            self_user_id: self.user_id.clone(),
            private_key,
            participants,
        };
        Ok(Subscription::spawn(self.feed.subscribe(conversation_id), ctx))
    }

    /// Forget the unlocked key and every cached copy of it. The sealed
    /// record stays on disk.
    pub fn sign_out(&self) {
        *self.private_key.write() = None;
        let purged = self.keystore().cache().clear(&self.user_id);
        info!(user_id = %self.user_id, purged, "signed out");
    }
}
