//! Message records as the document store holds them.
//!
//! The store sees:
//!   - id              (random UUID, no semantic meaning)
//!   - conversationId  (needed for subscription routing)
//!   - senderId        (needed to resolve the sender's public key)
//!   - perRecipientEnvelopes (user id → base64 nonce ‖ ciphertext)
//!   - timestamp       (delivery order)
//!
//! It cannot see plaintext: each participant's copy is sealed to that
//! participant alone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veil_crypto::EncryptedEnvelope;

/// One sent message, fanned out to every participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub per_recipient_envelopes: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    /// Build an outbound record from the fan-out output.
    pub fn new(
        conversation_id: &str,
        sender_id: &str,
        envelopes: BTreeMap<String, EncryptedEnvelope>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            per_recipient_envelopes: envelopes
                .into_iter()
                .map(|(user_id, envelope)| (user_id, envelope.to_b64()))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// The envelope addressed to `user_id`, if this device was a recipient.
    pub fn envelope_for(&self, user_id: &str) -> Option<&str> {
        self.per_recipient_envelopes.get(user_id).map(String::as_str)
    }

    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.per_recipient_envelopes.keys().map(String::as_str)
    }
}

/// A record that decrypted successfully for this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl DecryptedMessage {
    pub fn from_record(record: &MessageRecord, text: String) -> Self {
        Self {
            id: record.id.clone(),
            conversation_id: record.conversation_id.clone(),
            sender_id: record.sender_id.clone(),
            text,
            timestamp: record.timestamp,
        }
    }
}
