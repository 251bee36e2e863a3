//! veil_client — the per-user session tying the key store, the user
//! directory and the message feed together.
//!
//! # Flow
//! - outbound: `Session::send` resolves every participant's public key,
//!   fans the plaintext out, and hands one record to the feed
//! - inbound: `Session::subscribe` runs the decryption pipeline over the
//!   feed's live record set and republishes readable messages
//!
//! # Modules
//! - `session`  — unlock, send, subscribe, recovery entry points
//! - `pipeline` — record → message decryption and live subscriptions
//! - `logging`  — tracing subscriber setup
//! - `error`    — session errors

pub mod error;
pub mod logging;
pub mod pipeline;
pub mod session;

pub use error::SessionError;
pub use pipeline::{decrypt_records, PipelineContext, Subscription};
pub use session::Session;
