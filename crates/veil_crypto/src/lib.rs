//! veil_crypto — cryptographic core of the Veil messenger
//!
//! # Design principles
//! - NO custom crypto; every primitive comes from an audited RustCrypto crate.
//! - Private keys are zeroized on drop and redacted from `Debug` output.
//! - Expected failures (wrong password, tampered data) are returned as
//!   values, never panics.
//!
//! # Module layout
//! - `keys`     — X25519 key pairs for authenticated public-key encryption
//! - `kdf`      — PBKDF2-HMAC-SHA256 password key derivation
//! - `aead`     — AES-256-GCM helpers used to seal key material at rest
//! - `sealed`   — password sealing of a private key (`SealedKeyRecord`)
//! - `message`  — per-recipient envelopes and participant fan-out
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod message;
pub mod sealed;

pub use error::CryptoError;
pub use keys::{KeyPair, PrivateKey, PublicKeyBytes};
pub use message::EncryptedEnvelope;
pub use sealed::SealedKeyRecord;
