use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed input rejected before any cryptographic attempt.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Wrong password, wrong key pair or tampered ciphertext. Deliberately
    /// carries no detail.
    #[error("Authentication failed (wrong key or tampered data)")]
    AuthenticationFailed,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("No public key on record for participant {0}")]
    MissingParticipantKey(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
