//! veil_store — sealed local key storage for Veil
//!
//! # Storage strategy
//! - A user's private key is only ever written to disk sealed under a
//!   password-derived key (`veil_crypto::sealed`), one record per user id.
//! - Unsealed keys live in `DecryptedKeyCache`, an explicit object owned by
//!   the session, keyed by (user id, password digest) and never persisted.
//! - Losing or corrupting the sealed record is not fatal: callers move to
//!   the recovery flow in `recovery`.
//!
//! # Modules
//! - `backend`   — where sealed records live (file, memory)
//! - `cache`     — decrypted-key cache
//! - `keystore`  — store / retrieve / remove
//! - `recovery`  — restore from recovery material, enrol, regenerate
//! - `settings`  — store configuration
//! - `paths`     — default directories
//! - `error`     — store errors

pub mod backend;
pub mod cache;
pub mod error;
pub mod keystore;
pub mod paths;
pub mod recovery;
pub mod settings;

pub use backend::{FileKeyStorage, KeyStorage, MemoryKeyStorage};
pub use cache::DecryptedKeyCache;
pub use error::StoreError;
pub use keystore::{LocalKeyStore, RecoveryMaterial};
pub use recovery::{
    ProvisionedKeys, RecoveryHandshake, RecoveryManager, RecoveryPhase, RegenerationConfirmation,
};
pub use settings::StoreSettings;
