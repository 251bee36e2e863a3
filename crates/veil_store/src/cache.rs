//! Decrypted-key cache.
//!
//! Unsealing costs a full PBKDF2 run, so the first successful unseal for a
//! (user, password) pair is cached in memory. The cache is an explicit
//! object owned by the session and shared by `Arc`; it is never persisted.
//!
//! All entries sit behind one `RwLock`: concurrent readers are fine, and a
//! reader never observes a half-written insert or purge.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use veil_crypto::PrivateKey;

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    /// SHA-256 of the password; the cache never holds the password itself.
    password_digest: [u8; 32],
}

impl CacheKey {
    fn new(user_id: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"veil-key-cache-v1\x00");
        hasher.update(password.as_bytes());
        Self {
            user_id: user_id.to_string(),
            password_digest: hasher.finalize().into(),
        }
    }
}

impl Drop for CacheKey {
    fn drop(&mut self) {
        self.password_digest.zeroize();
    }
}

#[derive(Default)]
struct Entries {
    keys: HashMap<CacheKey, PrivateKey>,
    /// Bumped by every purge of a user. An unseal that started under an
    /// older generation must not repopulate the cache.
    generations: HashMap<String, u64>,
}

#[derive(Default)]
pub struct DecryptedKeyCache {
    entries: RwLock<Entries>,
}

impl DecryptedKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str, password: &str) -> Option<PrivateKey> {
        self.entries.read().keys.get(&CacheKey::new(user_id, password)).cloned()
    }

    pub fn insert(&self, user_id: &str, password: &str, key: PrivateKey) {
        self.entries.write().keys.insert(CacheKey::new(user_id, password), key);
    }

    /// Current purge generation of `user_id`. Read it before loading the
    /// sealed record and hand it back to [`Self::insert_if_current`].
    pub fn generation(&self, user_id: &str) -> u64 {
        self.entries.read().generations.get(user_id).copied().unwrap_or(0)
    }

    /// Insert only if `user_id` has not been purged since `generation` was
    /// read. Returns whether the key was cached.
    pub fn insert_if_current(
        &self,
        user_id: &str,
        password: &str,
        generation: u64,
        key: PrivateKey,
    ) -> bool {
        let mut entries = self.entries.write();
        if entries.generations.get(user_id).copied().unwrap_or(0) != generation {
            return false;
        }
        entries.keys.insert(CacheKey::new(user_id, password), key);
        true
    }

    /// Drop every entry for `user_id`, whatever password it was cached
    /// under, and invalidate in-flight unseals for that user. Returns the
    /// number of entries purged.
    pub fn clear(&self, user_id: &str) -> usize {
        let mut entries = self.entries.write();
        *entries.generations.entry(user_id.to_string()).or_insert(0) += 1;
        let before = entries.keys.len();
        entries.keys.retain(|k, _| k.user_id != user_id);
        before - entries.keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use veil_crypto::KeyPair;

    #[test]
    fn lookup_requires_matching_password() {
        let cache = DecryptedKeyCache::new();
        let pair = KeyPair::generate();
        cache.insert("alice", "pw1", pair.private.clone());

        assert_eq!(cache.get("alice", "pw1"), Some(pair.private.clone()));
        assert_eq!(cache.get("alice", "pw2"), None);
        assert_eq!(cache.get("bob", "pw1"), None);
    }

    #[test]
    fn clear_purges_every_password_for_one_user_only() {
        let cache = DecryptedKeyCache::new();
        let k = KeyPair::generate().private;
        cache.insert("alice", "pw1", k.clone());
        cache.insert("alice", "pw2", k.clone());
        cache.insert("alice2", "pw1", k.clone());
        cache.insert("bob", "pw1", k);

        assert_eq!(cache.clear("alice"), 2);
        assert_eq!(cache.get("alice", "pw1"), None);
        assert_eq!(cache.get("alice", "pw2"), None);
        // A user id that merely starts with "alice" is a different user.
        assert!(cache.get("alice2", "pw1").is_some());
        assert!(cache.get("bob", "pw1").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn purge_invalidates_older_generation() {
        let cache = DecryptedKeyCache::new();
        let old = KeyPair::generate().private;
        let stale = cache.generation("alice");

        cache.clear("alice");
        assert!(!cache.insert_if_current("alice", "pw", stale, old.clone()));
        assert_eq!(cache.get("alice", "pw"), None);

        // Other users keep their generation.
        assert!(cache.insert_if_current("bob", "pw", cache.generation("bob"), old.clone()));
        let current = cache.generation("alice");
        assert!(cache.insert_if_current("alice", "pw", current, old.clone()));
        assert_eq!(cache.get("alice", "pw"), Some(old));
    }

    #[test]
    fn concurrent_readers_see_whole_entries() {
        let cache = Arc::new(DecryptedKeyCache::new());
        let key = KeyPair::generate().private;
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            cache.insert("u", "pw", key.clone());
                        } else if let Some(found) = cache.get("u", "pw") {
                            assert_eq!(found, key);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
