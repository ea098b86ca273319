//! # Nullifier Registry
//!
//! A nullifier is `Poseidon(userSecret, appId)` — stable per (user, app),
//! unlinkable to the user, and consumed exactly once. The registry is a
//! set with one operation that matters: atomic first-writer-wins
//! registration. sled's compare-and-swap does the test-and-set in one
//! step, so two concurrent submissions of the same proof race safely —
//! one wins, the other gets [`NullifierError::AlreadyUsed`].
//!
//! There is no revocation. `absent → consumed` is the whole state
//! machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::encrypted::{EncryptedKv, StoreError};

/// Errors from nullifier registration.
#[derive(Debug, Error)]
pub enum NullifierError {
    /// The nullifier was consumed earlier (or a heartbeat ago, by a
    /// concurrent request — the distinction doesn't matter).
    #[error("nullifier already used at {used_at}")]
    AlreadyUsed { used_at: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The stored registration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullifierEntry {
    /// Decimal field element, also the store key.
    pub nullifier: String,
    /// The credential commitment this consumption was proven against.
    pub credential_id: String,
    /// Application id from the proof's public signals.
    pub app_id: String,
    /// Epoch milliseconds of consumption.
    pub used_at: i64,
}

/// The registry over the `nullifiers` store.
pub struct NullifierRegistry {
    kv: EncryptedKv,
}

impl NullifierRegistry {
    pub fn new(kv: EncryptedKv) -> Self {
        Self { kv }
    }

    /// Consume a nullifier. First caller wins; everyone else gets
    /// [`NullifierError::AlreadyUsed`] with the original timestamp.
    pub fn register(
        &self,
        nullifier: &str,
        credential_id: &str,
        app_id: &str,
    ) -> Result<NullifierEntry, NullifierError> {
        let entry = NullifierEntry {
            nullifier: nullifier.to_string(),
            credential_id: credential_id.to_string(),
            app_id: app_id.to_string(),
            used_at: chrono::Utc::now().timestamp_millis(),
        };

        if self.kv.put_if_absent(nullifier, &entry)? {
            return Ok(entry);
        }

        // Lost the race (or a replay): surface when it was first used.
        let existing: Option<NullifierEntry> = self.kv.get(nullifier)?;
        let used_at = existing.map(|e| e.used_at).unwrap_or_default();
        Err(NullifierError::AlreadyUsed { used_at })
    }

    /// Whether a nullifier has been consumed.
    pub fn is_used(&self, nullifier: &str) -> Result<bool, NullifierError> {
        Ok(self.kv.contains(nullifier)?)
    }

    /// Fetch a consumption record.
    pub fn get(&self, nullifier: &str) -> Result<Option<NullifierEntry>, NullifierError> {
        Ok(self.kv.get(nullifier)?)
    }

    /// Number of consumed nullifiers.
    pub fn len(&self) -> usize {
        self.kv.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::ZeroIdDb;

    fn registry() -> (ZeroIdDb, NullifierRegistry) {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.nullifiers_tree().clone(), [6u8; 32], "nullifiers");
        (db, NullifierRegistry::new(kv))
    }

    #[test]
    fn first_registration_wins() {
        let (_db, registry) = registry();
        let entry = registry.register("12345", "hash-1", "app-1").unwrap();
        assert_eq!(entry.app_id, "app-1");
        assert!(registry.is_used("12345").unwrap());
        assert!(!registry.is_used("67890").unwrap());
    }

    #[test]
    fn second_registration_is_replay() {
        let (_db, registry) = registry();
        let first = registry.register("12345", "hash-1", "app-1").unwrap();

        let err = registry.register("12345", "hash-1", "app-1").unwrap_err();
        match err {
            NullifierError::AlreadyUsed { used_at } => assert_eq!(used_at, first.used_at),
            other => panic!("expected AlreadyUsed, got {other:?}"),
        }

        // The original record is untouched.
        let stored = registry.get("12345").unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[test]
    fn concurrent_registration_consumes_exactly_once() {
        use std::sync::Arc;

        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.nullifiers_tree().clone(), [6u8; 32], "nullifiers");
        let registry = Arc::new(NullifierRegistry::new(kv));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register("99999", "hash", "app").is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1, "exactly one concurrent registration may win");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_nullifiers_are_independent() {
        let (_db, registry) = registry();
        for i in 0..10 {
            registry
                .register(&format!("{i}"), "hash", "app")
                .unwrap();
        }
        assert_eq!(registry.len(), 10);
    }
}
