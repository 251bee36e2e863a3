//! Asymmetric key pairs
//!
//! Each account owns one X25519 key pair used with the `crypto_box`
//! construction (X25519 key agreement + XSalsa20-Poly1305).
//!
//! - The public half is published to the user directory.
//! - The private half never leaves the device in cleartext, except once as
//!   the base64 recovery string shown at enrolment or regeneration.
//!
//! Every constructor that accepts external bytes validates the length
//! against the scheme constants below.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// X25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// X25519 secret key length.
pub const PRIVATE_KEY_LEN: usize = 32;

// ── Public key ────────────────────────────────────────────────────────────────

/// 32-byte public key, base64-encoded on the wire and in the directory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKeyBytes {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_box_public(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyBytes").field(&self.to_b64()).finish()
    }
}

impl Serialize for PublicKeyBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_b64())
    }
}

impl<'de> Deserialize<'de> for PublicKeyBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKeyBytes::from_b64(&s).map_err(serde::de::Error::custom)
    }
}

// ── Private key ───────────────────────────────────────────────────────────────

/// 32-byte private key. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "Private key must be {PRIVATE_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; PRIVATE_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Decode a base64 private key, ignoring surrounding whitespace (users
    /// paste recovery strings with trailing newlines).
    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(STANDARD.decode(s.trim())?);
        Self::from_bytes(&bytes)
    }

    pub fn to_b64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(*self.to_box_secret().public_key().as_bytes())
    }

    pub(crate) fn to_box_secret(&self) -> SecretKey {
        SecretKey::from(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for PrivateKey {}

// ── Key pair ──────────────────────────────────────────────────────────────────

/// An account's encryption key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub public: PublicKeyBytes,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = PublicKeyBytes(*secret.public_key().as_bytes());
        Self {
            public,
            private: PrivateKey(secret.to_bytes()),
        }
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &self.private)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pairs_are_distinct_and_consistent() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
        assert_ne!(a.private, b.private);
        assert_eq!(a.private.public_key(), a.public);
        assert_eq!(a.public.as_bytes().len(), PUBLIC_KEY_LEN);
        assert_eq!(a.private.as_bytes().len(), PRIVATE_KEY_LEN);
    }

    #[test]
    fn private_key_b64_trims_and_validates_length() {
        let pair = KeyPair::generate();
        let encoded = format!("  {}\n", pair.private.to_b64().as_str());
        let decoded = PrivateKey::from_b64(&encoded).unwrap();
        assert_eq!(decoded, pair.private);

        let short = STANDARD.encode([7u8; 31]);
        assert!(matches!(
            PrivateKey::from_b64(&short),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            PrivateKey::from_b64("not base64 !!"),
            Err(CryptoError::Base64Decode(_))
        ));
    }

    #[test]
    fn public_key_serialises_as_base64_string() {
        let pair = KeyPair::generate();
        let json = serde_json::to_string(&pair.public).unwrap();
        assert_eq!(json, format!("\"{}\"", pair.public.to_b64()));
        let back: PublicKeyBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair.public);

        let bad = format!("\"{}\"", STANDARD.encode([1u8; 16]));
        assert!(serde_json::from_str::<PublicKeyBytes>(&bad).is_err());
    }

    #[test]
    fn debug_output_never_contains_private_bytes() {
        let pair = KeyPair::generate();
        let printed = format!("{pair:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(pair.private.to_b64().as_str()));
    }

    #[test]
    fn fingerprint_is_ten_groups_of_four() {
        let fp = KeyPair::generate().public.fingerprint();
        let groups: Vec<&str> = fp.split(' ').collect();
        assert_eq!(groups.len(), 10);
        assert!(groups.iter().all(|g| g.len() == 4));
    }
}
