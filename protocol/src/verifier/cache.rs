//! # Two-Layer Verification Cache
//!
//! Groth16 verification is milliseconds of pairing arithmetic; a replayed
//! submission should cost microseconds. The cache is keyed by a SHA-256
//! fingerprint of the canonical `{proof, publicSignals}` JSON and layered:
//!
//! - **L1** — in-process, bounded at 10 000 entries with a 1-hour TTL.
//!   Strict LRU: a hit refreshes recency, eviction removes the
//!   least-recently-used entry. One mutex, single-writer discipline —
//!   reads contend but can never observe a stale-past-TTL entry.
//! - **L2** — the encrypted `proof_cache` store. Survives restarts; an
//!   L2 hit is promoted into L1 on the way out.
//!
//! TTL is enforced on read and on insert for both layers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::{CACHE_TTL, L1_CACHE_CAPACITY};
use crate::crypto::hash::sha256_hex;
use crate::store::encrypted::{EncryptedKv, StoreError};
use crate::verifier::groth16::PublicSignals;
use crate::verifier::snark::ProofJson;

/// A cached verification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofCacheEntry {
    /// SHA-256 hex of the canonical submission JSON; also the key.
    pub proof_fingerprint: String,
    pub valid: bool,
    /// Nullifier signal of the submission (decimal string).
    pub nullifier: String,
    /// Epoch milliseconds of the original verification.
    pub verified_at: i64,
}

/// Which layer answered a cache lookup. Feeds metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    L1,
    L2,
}

/// Compute the submission fingerprint.
///
/// The canonical form is `serde_json::Value` of
/// `{"proof": …, "publicSignals": […]}` — `Value` objects sort their
/// keys, so semantically identical submissions hash identically
/// regardless of the field order the client sent.
pub fn fingerprint(proof: &ProofJson, signals: &PublicSignals) -> String {
    let canonical = serde_json::json!({
        "proof": proof,
        "publicSignals": signals.raw(),
    });
    sha256_hex(canonical.to_string().as_bytes())
}

struct L1Entry {
    entry: ProofCacheEntry,
    inserted_at: Instant,
    /// Monotone recency stamp; larger = more recently touched.
    touch: u64,
}

struct L1State {
    entries: HashMap<String, L1Entry>,
    clock: u64,
}

/// The two-layer cache.
pub struct VerificationCache {
    l1: Mutex<L1State>,
    l2: EncryptedKv,
    capacity: usize,
    ttl: Duration,
}

impl VerificationCache {
    /// Production configuration over the `proof_cache` store.
    pub fn new(l2: EncryptedKv) -> Self {
        Self::with_limits(l2, L1_CACHE_CAPACITY, CACHE_TTL)
    }

    /// Explicit limits, for tests exercising eviction and expiry.
    pub fn with_limits(l2: EncryptedKv, capacity: usize, ttl: Duration) -> Self {
        Self {
            l1: Mutex::new(L1State {
                entries: HashMap::new(),
                clock: 0,
            }),
            l2,
            capacity,
            ttl,
        }
    }

    /// Look up a fingerprint. L1 first; an L2 hit is promoted.
    pub fn get(&self, fp: &str) -> Result<Option<(ProofCacheEntry, CacheLayer)>, StoreError> {
        {
            let mut state = self.l1.lock();
            state.clock += 1;
            let clock = state.clock;

            match state.entries.get_mut(fp) {
                Some(slot) if slot.inserted_at.elapsed() <= self.ttl => {
                    slot.touch = clock;
                    return Ok(Some((slot.entry.clone(), CacheLayer::L1)));
                }
                Some(_) => {
                    // Expired in place; drop before anyone sees it.
                    state.entries.remove(fp);
                }
                None => {}
            }
        }

        let Some(entry) = self.l2.get::<ProofCacheEntry>(fp)? else {
            return Ok(None);
        };

        // L2 has wall-clock TTL (it survives restarts).
        let age_ms = chrono::Utc::now().timestamp_millis() - entry.verified_at;
        if age_ms < 0 || age_ms as u128 > self.ttl.as_millis() {
            self.l2.remove(fp)?;
            return Ok(None);
        }

        self.insert_l1(fp, entry.clone());
        Ok(Some((entry, CacheLayer::L2)))
    }

    /// Record a verification result in both layers.
    pub fn set(&self, fp: &str, valid: bool, nullifier: &str) -> Result<ProofCacheEntry, StoreError> {
        let entry = ProofCacheEntry {
            proof_fingerprint: fp.to_string(),
            valid,
            nullifier: nullifier.to_string(),
            verified_at: chrono::Utc::now().timestamp_millis(),
        };

        // L2 first: if the process dies between these writes, the
        // durable layer is the one that must not be missing.
        self.l2.put(fp, &entry)?;
        self.insert_l1(fp, entry.clone());
        Ok(entry)
    }

    /// Current L1 population (test and metrics support).
    pub fn l1_len(&self) -> usize {
        self.l1.lock().entries.len()
    }

    fn insert_l1(&self, fp: &str, entry: ProofCacheEntry) {
        let mut state = self.l1.lock();
        state.clock += 1;
        let clock = state.clock;

        // TTL check on insert: purge any expired entries before the
        // capacity decision, so dead weight never forces an eviction.
        let ttl = self.ttl;
        state.entries.retain(|_, slot| slot.inserted_at.elapsed() <= ttl);

        if state.entries.len() >= self.capacity && !state.entries.contains_key(fp) {
            if let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.touch)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            fp.to_string(),
            L1Entry {
                entry,
                inserted_at: Instant::now(),
                touch: clock,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::ZeroIdDb;

    fn cache(capacity: usize, ttl: Duration) -> (ZeroIdDb, VerificationCache) {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.proof_cache_tree().clone(), [8u8; 32], "proof_cache");
        (db, VerificationCache::with_limits(kv, capacity, ttl))
    }

    fn sample_proof() -> ProofJson {
        ProofJson {
            pi_a: vec!["0".into(), "1".into(), "0".into()],
            pi_b: vec![
                vec!["0".into(), "0".into()],
                vec!["1".into(), "0".into()],
                vec!["0".into(), "0".into()],
            ],
            pi_c: vec!["0".into(), "1".into(), "0".into()],
            protocol: Some("groth16".into()),
            curve: Some("bn128".into()),
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_input_sensitive() {
        let proof = sample_proof();
        let signals_a = PublicSignals::new(vec!["1".into(), "2".into()]).unwrap();
        let signals_b = PublicSignals::new(vec!["1".into(), "3".into()]).unwrap();

        assert_eq!(fingerprint(&proof, &signals_a), fingerprint(&proof, &signals_a));
        assert_ne!(fingerprint(&proof, &signals_a), fingerprint(&proof, &signals_b));
        // 64 hex chars of SHA-256.
        assert_eq!(fingerprint(&proof, &signals_a).len(), 64);
    }

    #[test]
    fn set_then_get_hits_l1() {
        let (_db, cache) = cache(10, Duration::from_secs(60));
        cache.set("fp-1", true, "555").unwrap();

        let (entry, layer) = cache.get("fp-1").unwrap().unwrap();
        assert!(entry.valid);
        assert_eq!(entry.nullifier, "555");
        assert_eq!(layer, CacheLayer::L1);
    }

    #[test]
    fn miss_is_none() {
        let (_db, cache) = cache(10, Duration::from_secs(60));
        assert!(cache.get("absent").unwrap().is_none());
    }

    #[test]
    fn l2_survives_l1_loss_and_promotes() {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.proof_cache_tree().clone(), [8u8; 32], "proof_cache");
        {
            let cache = VerificationCache::with_limits(kv.clone(), 10, Duration::from_secs(60));
            cache.set("fp-1", false, "777").unwrap();
        }

        // A fresh cache instance simulates a restart: empty L1, warm L2.
        let cache = VerificationCache::with_limits(kv, 10, Duration::from_secs(60));
        assert_eq!(cache.l1_len(), 0);

        let (entry, layer) = cache.get("fp-1").unwrap().unwrap();
        assert_eq!(layer, CacheLayer::L2);
        assert!(!entry.valid);

        // Promotion happened: second read is L1.
        let (_, layer) = cache.get("fp-1").unwrap().unwrap();
        assert_eq!(layer, CacheLayer::L1);
    }

    #[test]
    fn capacity_eviction_drops_least_recently_used() {
        let (_db, cache) = cache(3, Duration::from_secs(60));
        cache.set("a", true, "1").unwrap();
        cache.set("b", true, "2").unwrap();
        cache.set("c", true, "3").unwrap();

        // Touch "a" so "b" becomes the least-recently-used.
        cache.get("a").unwrap();

        cache.set("d", true, "4").unwrap();
        assert_eq!(cache.l1_len(), 3);

        // "b" fell out of L1 (it still answers from L2, one layer down).
        let (_, layer) = cache.get("b").unwrap().unwrap();
        assert_eq!(layer, CacheLayer::L2);
        let (_, layer) = cache.get("a").unwrap().unwrap();
        assert_eq!(layer, CacheLayer::L1);
    }

    #[test]
    fn expired_l1_entry_is_never_returned() {
        let (db, cache) = cache(10, Duration::from_millis(20));
        cache.set("fp-1", true, "5").unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // Wipe L2 so only the (expired) L1 slot could answer.
        db.proof_cache_tree().clear().unwrap();
        assert!(cache.get("fp-1").unwrap().is_none());
        assert_eq!(cache.l1_len(), 0);
    }

    #[test]
    fn stale_l2_entry_is_dropped() {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.proof_cache_tree().clone(), [8u8; 32], "proof_cache");

        // Plant an entry verified an hour and a bit ago.
        let stale = ProofCacheEntry {
            proof_fingerprint: "fp-old".into(),
            valid: true,
            nullifier: "9".into(),
            verified_at: chrono::Utc::now().timestamp_millis() - 3_700_000,
        };
        kv.put("fp-old", &stale).unwrap();

        let cache = VerificationCache::with_limits(kv.clone(), 10, CACHE_TTL);
        assert!(cache.get("fp-old").unwrap().is_none());
        // And it was reaped from L2, not just skipped.
        assert!(!kv.contains("fp-old").unwrap());
    }

    #[test]
    fn overwrite_updates_value() {
        let (_db, cache) = cache(10, Duration::from_secs(60));
        cache.set("fp-1", false, "5").unwrap();
        cache.set("fp-1", true, "5").unwrap();
        let (entry, _) = cache.get("fp-1").unwrap().unwrap();
        assert!(entry.valid);
        assert_eq!(cache.l1_len(), 1);
    }
}
