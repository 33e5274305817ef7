//! WebAuthn storage module
//!
//! - **Pending ceremonies**: registration and authentication states, keyed by
//!   employee id. Temporary; they expire after 5 minutes and are consumed on
//!   first use.
//! - **Passkeys**: credentials registered per employee, in memory.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;
use webauthn_rs::prelude::*;

/// Maximum age for pending ceremony states (5 minutes)
const CHALLENGE_EXPIRY_SECS: u64 = 300;

struct PendingEntry<T> {
    state: T,
    expires_at: Instant,
}

/// Single-use ceremony states with expiry
pub struct PendingStore<T> {
    entries: DashMap<String, PendingEntry<T>>,
    ttl: Duration,
}

impl<T> Default for PendingStore<T> {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(CHALLENGE_EXPIRY_SECS))
    }
}

impl<T> PendingStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store `state` for `key`, replacing any pending one.
    pub fn insert(&self, key: impl Into<String>, state: T) {
        self.entries.insert(
            key.into(),
            PendingEntry {
                state,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Retrieve and remove the state for `key` unless it has expired.
    pub fn take(&self, key: &str) -> Option<T> {
        let (_, entry) = self.entries.remove(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.state)
        } else {
            None // Expired
        }
    }

    /// Remove expired states (called periodically)
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> std::fmt::Debug for PendingStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStore")
            .field("pending", &self.entries.len())
            .finish()
    }
}

/// Registered passkeys per employee
#[derive(Default)]
pub struct PasskeyStore {
    passkeys: DashMap<String, Vec<Passkey>>,
    /// Stable WebAuthn user handle per employee
    handles: DashMap<String, Uuid>,
}

impl PasskeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// WebAuthn user handle for `user_id`, created on first use.
    pub fn handle_for(&self, user_id: &str) -> Uuid {
        *self
            .handles
            .entry(user_id.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    pub fn passkeys_for(&self, user_id: &str) -> Vec<Passkey> {
        self.passkeys
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.passkeys
            .get(user_id)
            .is_some_and(|p| !p.is_empty())
    }

    /// Add `passkey` for `user_id`, replacing one with the same credential id.
    pub fn add(&self, user_id: &str, passkey: Passkey) {
        let mut entry = self.passkeys.entry(user_id.to_string()).or_default();
        entry.retain(|existing| existing.cred_id() != passkey.cred_id());
        entry.push(passkey);
    }

    /// Apply counter updates from a successful authentication.
    pub fn record_use(&self, user_id: &str, result: &AuthenticationResult) {
        if let Some(mut entry) = self.passkeys.get_mut(user_id) {
            for passkey in entry.iter_mut() {
                passkey.update_credential(result);
            }
        }
    }
}

impl std::fmt::Debug for PasskeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyStore")
            .field("users", &self.passkeys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_state_is_single_use() {
        let store = PendingStore::new();
        store.insert("2", vec![1u8, 2, 3]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.take("2"), Some(vec![1, 2, 3]));
        assert_eq!(store.take("2"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_state_is_dropped() {
        let store = PendingStore::with_ttl(Duration::ZERO);
        store.insert("2", "challenge");
        assert_eq!(store.take("2"), None);

        store.insert("4", "challenge");
        store.cleanup_expired();
        assert!(store.is_empty());
    }

    #[test]
    fn test_user_handle_is_stable() {
        let store = PasskeyStore::new();
        let first = store.handle_for("2");
        assert_eq!(store.handle_for("2"), first);
        assert_ne!(store.handle_for("4"), first);
        assert!(!store.is_registered("2"));
    }
}
