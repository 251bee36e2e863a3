use thiserror::Error;

use veil_crypto::CryptoError;

/// Closed set of key-store outcomes. Callers log the precise variant and
/// show the end user one uniform "cannot unlock" message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication failed (wrong password or corrupted record)")]
    AuthenticationFailed,

    #[error("No sealed key on record for user {0}")]
    KeyNotFound(String),

    #[error("Recovery key does not match the published public key")]
    KeyMismatch,

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key derivation task failed: {0}")]
    Task(String),

    #[error("Directory error: {0}")]
    Directory(#[from] veil_proto::ProtoError),

    #[error("Invalid recovery transition: {0}")]
    Handshake(String),

    #[error("Encryption failed")]
    Encryption,
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => StoreError::AuthenticationFailed,
            CryptoError::Encryption => StoreError::Encryption,
            other => StoreError::InvalidInput(other.to_string()),
        }
    }
}
