//! Password sealing of a private key
//!
//! Storage format (one record per user, base64 STANDARD):
//!   [ salt (16 bytes) | nonce (12 bytes) | AES-256-GCM ciphertext + tag ]
//!
//! The layout is load-bearing: records written by earlier clients must keep
//! unsealing, so field order and lengths never change.

use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

use crate::{
    aead::{self, NONCE_LEN, TAG_LEN},
    error::CryptoError,
    kdf::{self, SALT_LEN},
    keys::{PrivateKey, PRIVATE_KEY_LEN},
};

/// Smallest decodable record: salt + nonce + an empty ciphertext's tag.
const MIN_RECORD_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// A private key sealed under a password-derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKeyRecord {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedKeyRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_RECORD_LEN {
            return Err(CryptoError::InvalidInput(format!(
                "sealed record must be at least {MIN_RECORD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let mut record = SealedKeyRecord {
            salt: [0u8; SALT_LEN],
            nonce: [0u8; NONCE_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        record.salt.copy_from_slice(salt);
        record.nonce.copy_from_slice(nonce);
        Ok(record)
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes)
    }
}

/// Seal `private_key` under `password` with a fresh random salt and nonce.
pub fn seal(private_key: &PrivateKey, password: &str) -> Result<SealedKeyRecord, CryptoError> {
    seal_with(private_key, password, kdf::generate_salt(), aead::generate_nonce())
}

/// Deterministic sealing for a caller-chosen salt and nonce.
///
/// Reusing a (salt, nonce) pair for a different key under the same password
/// breaks AES-GCM; production code goes through [`seal`].
pub fn seal_with(
    private_key: &PrivateKey,
    password: &str,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
) -> Result<SealedKeyRecord, CryptoError> {
    let key = kdf::sealing_key_from_password(password, &salt);
    let ciphertext = aead::encrypt(&key.0, &nonce, private_key.as_bytes())?;
    Ok(SealedKeyRecord {
        salt,
        nonce,
        ciphertext,
    })
}

/// Re-derive the sealing key and open the record.
///
/// A wrong password and a corrupted record both surface as
/// `AuthenticationFailed`; a record that authenticates but holds the wrong
/// number of bytes is `InvalidKey`.
pub fn unseal(record: &SealedKeyRecord, password: &str) -> Result<PrivateKey, CryptoError> {
    let key = kdf::sealing_key_from_password(password, &record.salt);
    let plaintext: Zeroizing<Vec<u8>> = aead::decrypt(&key.0, &record.nonce, &record.ciphertext)?;
    if plaintext.len() != PRIVATE_KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "unsealed key is {} bytes",
            plaintext.len()
        )));
    }
    PrivateKey::from_bytes(&plaintext)
}
