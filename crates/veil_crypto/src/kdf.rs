//! Password key derivation
//!
//! `sealing_key_from_password`: PBKDF2-HMAC-SHA256, derives the 32-byte key
//!   used to seal a private key at rest.
//!
//! The iteration count is fixed: the persisted record layout
//! (salt ‖ nonce ‖ ciphertext) carries no KDF parameters, so changing it
//! would orphan every stored record.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

/// PBKDF2 rounds. Tuned for ~100 ms per derivation on commodity hardware.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const SEALING_KEY_LEN: usize = 32;

/// 32-byte sealing key derived from a user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SealingKey(pub [u8; SEALING_KEY_LEN]);

/// Derive a sealing key from a password + 16-byte salt.
/// The salt is stored alongside the sealed record (not secret).
pub fn sealing_key_from_password(password: &str, salt: &[u8; SALT_LEN]) -> SealingKey {
    let mut output = [0u8; SEALING_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut output);
    SealingKey(output)
}

/// Generate a fresh random 16-byte salt. Call on every seal.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
