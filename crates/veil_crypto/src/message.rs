//! Per-recipient message encryption
//!
//! Every message is encrypted independently for each conversation
//! participant with `crypto_box` (X25519 + XSalsa20-Poly1305), using the
//! sender's private key and that participant's public key. There is no
//! shared ciphertext.
//!
//! Envelope wire format (base64 STANDARD):
//!   [ nonce (24 bytes) | ciphertext + tag ]

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::{
    aead::{Aead, AeadCore, OsRng},
    SalsaBox,
};

use crate::{
    error::CryptoError,
    keys::{PrivateKey, PublicKeyBytes},
};

/// Box nonce length.
pub const BOX_NONCE_LEN: usize = 24;
/// Poly1305 tag length.
pub const BOX_TAG_LEN: usize = 16;

/// One recipient's copy of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub nonce: [u8; BOX_NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BOX_NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < BOX_NONCE_LEN + BOX_TAG_LEN {
            return Err(CryptoError::InvalidInput(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(BOX_NONCE_LEN);
        let mut nonce = [0u8; BOX_NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypt `plaintext` (UTF-8) for one recipient with a fresh random nonce.
pub fn encrypt_for_recipient(
    plaintext: &str,
    recipient_public: &PublicKeyBytes,
    sender_private: &PrivateKey,
) -> Result<EncryptedEnvelope, CryptoError> {
    let salsa_box = SalsaBox::new(&recipient_public.to_box_public(), &sender_private.to_box_secret());
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ciphertext = salsa_box
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    let mut nonce_bytes = [0u8; BOX_NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    Ok(EncryptedEnvelope {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open an envelope, reporting why it failed.
///
/// Callers that face end users should prefer [`decrypt_from_sender`], which
/// collapses every failure into `None`.
pub fn open_envelope(
    envelope: &EncryptedEnvelope,
    sender_public: &PublicKeyBytes,
    recipient_private: &PrivateKey,
) -> Result<String, CryptoError> {
    let salsa_box = SalsaBox::new(&sender_public.to_box_public(), &recipient_private.to_box_secret());
    let plaintext = salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_slice(),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::InvalidInput("plaintext is not UTF-8".into()))
}

/// Decode and open a base64 envelope. Wrong keys, truncated input and tag
/// mismatches are indistinguishable to the caller: all yield `None`.
pub fn decrypt_from_sender(
    envelope_b64: &str,
    sender_public: &PublicKeyBytes,
    recipient_private: &PrivateKey,
) -> Option<String> {
    let result = EncryptedEnvelope::from_b64(envelope_b64)
        .and_then(|envelope| open_envelope(&envelope, sender_public, recipient_private));
    match result {
        Ok(plaintext) => Some(plaintext),
        Err(err) => {
            tracing::debug!("envelope rejected: {err}");
            None
        }
    }
}

/// Fan a plaintext out to every participant, the sender included.
///
/// `participant_keys` maps user id → resolved public key (`None` when the
/// directory has no entry). A single unresolved participant aborts the
/// whole send: a recipient without a readable copy is a correctness bug,
/// not a partial success. The sender's own id is added with its own public
/// key when absent so sent messages stay readable on this device.
pub fn encrypt_for_all_participants(
    plaintext: &str,
    participant_keys: &BTreeMap<String, Option<PublicKeyBytes>>,
    sender_id: &str,
    sender_private: &PrivateKey,
) -> Result<BTreeMap<String, EncryptedEnvelope>, CryptoError> {
    let mut resolved: BTreeMap<&str, PublicKeyBytes> = BTreeMap::new();
    for (user_id, key) in participant_keys {
        match key {
            Some(key) => {
                resolved.insert(user_id.as_str(), *key);
            }
            None if user_id == sender_id => {}
            None => return Err(CryptoError::MissingParticipantKey(user_id.clone())),
        }
    }
    resolved
        .entry(sender_id)
        .or_insert_with(|| sender_private.public_key());

    resolved
        .into_iter()
        .map(|(user_id, key)| {
            encrypt_for_recipient(plaintext, &key, sender_private)
                .map(|envelope| (user_id.to_string(), envelope))
        })
        .collect()
}
