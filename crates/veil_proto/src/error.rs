use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("User directory error: {0}")]
    Directory(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
