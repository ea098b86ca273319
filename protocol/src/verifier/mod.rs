//! # Proof Verification Pipeline
//!
//! Where the verifier subsystem comes together:
//!
//! ```text
//! snark.rs     — snarkjs JSON ⇄ arkworks conversion with validation
//! groth16.rs   — the prepared verification key + the signal contract
//! nullifier.rs — atomic single-use enforcement
//! cache.rs     — two-layer (LRU + encrypted KV) result cache
//! dev.rs       — local proving harness for development and tests
//! ```
//!
//! The submission path is strict about ordering: fingerprint → cache →
//! Groth16 → **nullifier registration** → cache write. The nullifier is
//! persisted before the result is cached, so a crash between the two
//! can at worst cost a redundant re-verification — never a double
//! spend of a nullifier.
//!
//! Groth16 verification is CPU-bound and runs on the blocking pool so
//! it cannot head-of-line-block the I/O reactor.

pub mod cache;
pub mod dev;
pub mod groth16;
pub mod nullifier;
pub mod snark;

pub use cache::{fingerprint, CacheLayer, ProofCacheEntry, VerificationCache};
pub use groth16::{ProofVerifier, PublicSignals, VerifierError};
pub use nullifier::{NullifierEntry, NullifierError, NullifierRegistry};
pub use snark::{ProofJson, SnarkError, VerifyingKeyJson};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::MAX_AGGREGATE_PROOFS;
use crate::store::audit::{metadata, AuditAction, AuditLog};
use crate::store::encrypted::StoreError;

/// One proof submission: the proof and its ordered public signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSubmission {
    pub proof: ProofJson,
    pub public_signals: Vec<String>,
}

/// The response to a single verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub valid: bool,
    pub nullifier: String,
    pub cached: bool,
}

/// Per-entry result inside an aggregate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateEntryResult {
    pub index: usize,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The aggregate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOutcome {
    pub all_valid: bool,
    pub total: usize,
    pub valid_count: usize,
    pub results: Vec<AggregateEntryResult>,
}

/// Errors from the verification pipeline.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Malformed submission: bad signal counts, non-decimal signals,
    /// off-curve points.
    #[error(transparent)]
    Invalid(#[from] VerifierError),

    /// The nullifier was consumed by an earlier (or concurrent) proof.
    #[error("nullifier {nullifier} already consumed")]
    Replay { nullifier: String, used_at: i64 },

    /// No verification key is loaded; proof routes are unavailable.
    #[error("no verification key loaded")]
    VerifierUnavailable,

    #[error("aggregate size {0} outside 1..={MAX_AGGREGATE_PROOFS}")]
    BadAggregateSize(usize),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("verification task failed: {0}")]
    Task(String),
}

/// The assembled pipeline.
pub struct ProofPipeline {
    /// Absent when `ZEROID_VKEY_PATH` was not configured; proof routes
    /// then answer "unavailable" instead of failing at boot.
    verifier: Option<Arc<ProofVerifier>>,
    cache: Arc<VerificationCache>,
    nullifiers: Arc<NullifierRegistry>,
    audit: Arc<AuditLog>,
}

impl ProofPipeline {
    pub fn new(
        verifier: Option<Arc<ProofVerifier>>,
        cache: Arc<VerificationCache>,
        nullifiers: Arc<NullifierRegistry>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            verifier,
            cache,
            nullifiers,
            audit,
        }
    }

    /// Whether a verification key is loaded.
    pub fn available(&self) -> bool {
        self.verifier.is_some()
    }

    /// Read access to the nullifier registry.
    pub fn nullifiers(&self) -> &NullifierRegistry {
        &self.nullifiers
    }

    /// Verify one submission through the full cache/verify/nullifier
    /// pipeline.
    pub async fn verify_submission(
        &self,
        submission: ProofSubmission,
    ) -> Result<VerifyOutcome, VerifyError> {
        let signals = PublicSignals::new(submission.public_signals.clone())?;
        let nullifier = signals.nullifier()?.to_string();
        let app_id = signals.app_id()?.to_string();
        let credential_hash = signals.credential_hash()?.to_string();
        let fp = fingerprint(&submission.proof, &signals);

        if let Some((entry, layer)) = self.cache.get(&fp)? {
            tracing::debug!(fingerprint = %fp, ?layer, "verification cache hit");
            return Ok(VerifyOutcome {
                valid: entry.valid,
                nullifier: entry.nullifier,
                cached: true,
            });
        }

        let verifier = self
            .verifier
            .as_ref()
            .ok_or(VerifyError::VerifierUnavailable)?;

        // Pairing arithmetic belongs on the blocking pool.
        let valid = {
            let verifier = Arc::clone(verifier);
            let proof = submission.proof.clone();
            let signals = signals.clone();
            tokio::task::spawn_blocking(move || verifier.verify(&proof, &signals))
                .await
                .map_err(|e| VerifyError::Task(e.to_string()))??
        };

        if valid {
            // Register before caching: a consumed nullifier must never
            // depend on a cache write having happened.
            match self.nullifiers.register(&nullifier, &credential_hash, &app_id) {
                Ok(_) => {
                    self.audit.append(
                        AuditAction::NullifierRegister,
                        &nullifier,
                        "system",
                        metadata([("app_id", &app_id)]),
                    )?;
                }
                Err(NullifierError::AlreadyUsed { used_at }) => {
                    tracing::warn!(nullifier = %nullifier, "proof replay detected");
                    return Err(VerifyError::Replay { nullifier, used_at });
                }
                Err(NullifierError::Store(e)) => return Err(e.into()),
            }
        }

        self.cache.set(&fp, valid, &nullifier)?;
        self.audit.append(
            AuditAction::ProofVerify,
            &fp,
            "system",
            metadata([("valid", if valid { "true" } else { "false" })]),
        )?;

        Ok(VerifyOutcome {
            valid,
            nullifier,
            cached: false,
        })
    }

    /// Verify a batch concurrently with per-entry isolation: one
    /// malformed or panicking entry fills its own error slot and
    /// nothing else's. Results come back in submission order.
    ///
    /// Aggregation is read-only — it neither consumes nullifiers nor
    /// writes the cache. Callers wanting those effects submit entries
    /// individually.
    pub async fn aggregate(
        &self,
        entries: Vec<ProofSubmission>,
    ) -> Result<AggregateOutcome, VerifyError> {
        if entries.is_empty() || entries.len() > MAX_AGGREGATE_PROOFS {
            return Err(VerifyError::BadAggregateSize(entries.len()));
        }
        let verifier = self
            .verifier
            .as_ref()
            .ok_or(VerifyError::VerifierUnavailable)?;

        let total = entries.len();
        let handles: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let verifier = Arc::clone(verifier);
                tokio::task::spawn_blocking(move || verify_isolated(&verifier, entry))
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(Ok(valid)) => AggregateEntryResult {
                    index,
                    valid,
                    error: None,
                },
                Ok(Err(message)) => AggregateEntryResult {
                    index,
                    valid: false,
                    error: Some(message),
                },
                // A panic inside one verification is contained here.
                Err(join_error) => AggregateEntryResult {
                    index,
                    valid: false,
                    error: Some(join_error.to_string()),
                },
            };
            results.push(result);
        }

        let valid_count = results.iter().filter(|r| r.valid).count();
        Ok(AggregateOutcome {
            all_valid: valid_count == total,
            total,
            valid_count,
            results,
        })
    }
}

/// Verify one aggregate entry, mapping every failure to a message.
fn verify_isolated(verifier: &ProofVerifier, entry: ProofSubmission) -> Result<bool, String> {
    let signals = PublicSignals::new(entry.public_signals).map_err(|e| e.to_string())?;
    verifier.verify(&entry.proof, &signals).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::ZeroIdDb;
    use crate::store::encrypted::EncryptedKv;
    use crate::verifier::dev::DevProver;

    struct Fixture {
        pipeline: ProofPipeline,
        prover: DevProver,
        audit: Arc<AuditLog>,
        _db: ZeroIdDb,
    }

    fn fixture() -> Fixture {
        let db = ZeroIdDb::open_temporary().unwrap();
        let audit = Arc::new(AuditLog::open(db.audit_tree().clone(), [2u8; 32]).unwrap());
        let prover = DevProver::setup_deterministic();

        let pipeline = ProofPipeline::new(
            Some(Arc::new(ProofVerifier::from_ark_vk(
                prover.verifying_key().clone(),
            ))),
            Arc::new(VerificationCache::new(EncryptedKv::new(
                db.proof_cache_tree().clone(),
                [8u8; 32],
                "proof_cache",
            ))),
            Arc::new(NullifierRegistry::new(EncryptedKv::new(
                db.nullifiers_tree().clone(),
                [6u8; 32],
                "nullifiers",
            ))),
            Arc::clone(&audit),
        );

        Fixture {
            pipeline,
            prover,
            audit,
            _db: db,
        }
    }

    fn submission(prover: &DevProver, nullifier: &str) -> ProofSubmission {
        let (proof, signals) =
            prover.prove_signals(&["1", "2", "18", "408", "77", nullifier, "999"]);
        ProofSubmission {
            proof,
            public_signals: signals.raw().to_vec(),
        }
    }

    #[tokio::test]
    async fn fresh_valid_proof_verifies_and_registers() {
        let fx = fixture();
        let outcome = fx
            .pipeline
            .verify_submission(submission(&fx.prover, "4242"))
            .await
            .unwrap();

        assert!(outcome.valid);
        assert!(!outcome.cached);
        assert_eq!(outcome.nullifier, "4242");
        assert!(fx.pipeline.nullifiers().is_used("4242").unwrap());
        assert_eq!(
            fx.audit.count_by_action(AuditAction::NullifierRegister).unwrap(),
            1
        );
        assert_eq!(fx.audit.count_by_action(AuditAction::ProofVerify).unwrap(), 1);
    }

    #[tokio::test]
    async fn identical_resubmission_hits_cache() {
        let fx = fixture();
        let sub = submission(&fx.prover, "4242");

        let first = fx.pipeline.verify_submission(sub.clone()).await.unwrap();
        assert!(!first.cached);

        let second = fx.pipeline.verify_submission(sub).await.unwrap();
        assert!(second.cached);
        assert!(second.valid);
        assert_eq!(second.nullifier, "4242");

        // The nullifier was consumed exactly once.
        assert_eq!(fx.pipeline.nullifiers().len(), 1);
    }

    #[tokio::test]
    async fn distinct_proof_same_nullifier_is_replay() {
        let fx = fixture();
        fx.pipeline
            .verify_submission(submission(&fx.prover, "4242"))
            .await
            .unwrap();

        // A different proof (fresh randomness ⇒ fresh fingerprint)
        // reusing the nullifier must be rejected as a replay.
        let result = fx
            .pipeline
            .verify_submission(submission(&fx.prover, "4242"))
            .await;
        assert!(matches!(result, Err(VerifyError::Replay { .. })));
        assert_eq!(fx.pipeline.nullifiers().len(), 1);
    }

    #[tokio::test]
    async fn invalid_proof_is_cached_but_consumes_nothing() {
        let fx = fixture();
        let mut sub = submission(&fx.prover, "4242");
        // Break the binding: swap the credential-hash signal.
        sub.public_signals[6] = "31337".to_string();

        let outcome = fx.pipeline.verify_submission(sub.clone()).await.unwrap();
        assert!(!outcome.valid);
        assert!(!outcome.cached);
        assert!(!fx.pipeline.nullifiers().is_used("4242").unwrap());

        let again = fx.pipeline.verify_submission(sub).await.unwrap();
        assert!(!again.valid);
        assert!(again.cached);
    }

    #[tokio::test]
    async fn unavailable_verifier_is_distinct_error() {
        let db = ZeroIdDb::open_temporary().unwrap();
        let audit = Arc::new(AuditLog::open(db.audit_tree().clone(), [2u8; 32]).unwrap());
        let pipeline = ProofPipeline::new(
            None,
            Arc::new(VerificationCache::new(EncryptedKv::new(
                db.proof_cache_tree().clone(),
                [8u8; 32],
                "proof_cache",
            ))),
            Arc::new(NullifierRegistry::new(EncryptedKv::new(
                db.nullifiers_tree().clone(),
                [6u8; 32],
                "nullifiers",
            ))),
            audit,
        );
        assert!(!pipeline.available());

        let prover = DevProver::setup_deterministic();
        let result = pipeline.verify_submission(submission(&prover, "1")).await;
        assert!(matches!(result, Err(VerifyError::VerifierUnavailable)));
    }

    #[tokio::test]
    async fn malformed_signals_rejected_before_any_work() {
        let fx = fixture();
        let mut sub = submission(&fx.prover, "4242");
        sub.public_signals.truncate(3);

        let result = fx.pipeline.verify_submission(sub).await;
        assert!(matches!(result, Err(VerifyError::Invalid(_))));
    }

    #[tokio::test]
    async fn aggregate_mixed_batch() {
        let fx = fixture();
        let mut entries = Vec::new();
        for i in 0..8 {
            entries.push(submission(&fx.prover, &format!("{}", 1000 + i)));
        }
        // Two poisoned entries: one wrong signal, one garbage proof.
        entries[3].public_signals[6] = "31337".to_string();
        entries[5].proof.pi_a = vec!["1".into(), "1".into(), "1".into()];

        let outcome = fx.pipeline.aggregate(entries).await.unwrap();
        assert_eq!(outcome.total, 8);
        assert_eq!(outcome.valid_count, 6);
        assert!(!outcome.all_valid);

        // Results preserve submission order.
        for (i, result) in outcome.results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert!(!outcome.results[3].valid);
        assert!(outcome.results[3].error.is_none()); // verified false, no error
        assert!(!outcome.results[5].valid);
        assert!(outcome.results[5].error.is_some()); // malformed point

        // Aggregation never consumes nullifiers.
        assert_eq!(fx.pipeline.nullifiers().len(), 0);
    }

    #[tokio::test]
    async fn aggregate_all_valid_iff_count_matches() {
        let fx = fixture();
        let entries = vec![
            submission(&fx.prover, "1"),
            submission(&fx.prover, "2"),
        ];
        let outcome = fx.pipeline.aggregate(entries).await.unwrap();
        assert!(outcome.all_valid);
        assert_eq!(outcome.valid_count, outcome.total);
    }

    #[tokio::test]
    async fn aggregate_size_bounds() {
        let fx = fixture();
        assert!(matches!(
            fx.pipeline.aggregate(vec![]).await,
            Err(VerifyError::BadAggregateSize(0))
        ));

        let sub = submission(&fx.prover, "1");
        let oversized = vec![sub; 101];
        assert!(matches!(
            fx.pipeline.aggregate(oversized).await,
            Err(VerifyError::BadAggregateSize(101))
        ));
    }
}
