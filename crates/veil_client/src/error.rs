use thiserror::Error;

use veil_crypto::CryptoError;
use veil_proto::ProtoError;
use veil_store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is locked: no private key available")]
    Locked,

    #[error("No public key on record for participant {0}")]
    MissingParticipantKey(String),

    #[error("No published public key for {0}; restore is impossible")]
    NoPublishedKey(String),

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MissingParticipantKey(user_id) => SessionError::MissingParticipantKey(user_id),
            other => SessionError::Crypto(other),
        }
    }
}

impl SessionError {
    /// Whether the UI should move to the recovery flow instead of showing
    /// a plain error.
    pub fn requires_recovery(&self) -> bool {
        matches!(
            self,
            SessionError::Locked
                | SessionError::Store(StoreError::KeyNotFound(_))
                | SessionError::Store(StoreError::AuthenticationFailed)
                | SessionError::Store(StoreError::InvalidInput(_))
        )
    }
}
