//! veil_proto — record shapes and collaborator interfaces for Veil
//!
//! The core never touches storage transport details. It consumes and
//! produces the record shape in `record` and talks to the outside world
//! only through the traits in `directory` and `feed`.
//!
//! # Modules
//! - `record`    — message record (per-recipient envelope map) and decrypted message
//! - `directory` — user directory of published public keys
//! - `feed`      — live-subscription message store
//! - `error`     — collaborator errors

pub mod directory;
pub mod error;
pub mod feed;
pub mod record;

pub use directory::{MemoryDirectory, UserDirectory};
pub use error::ProtoError;
pub use feed::{MemoryFeed, MessageFeed};
pub use record::{DecryptedMessage, MessageRecord};
