//! # The Root Service Handle
//!
//! One explicitly constructed object owning every subsystem: stores,
//! keys, sanctions tree, issuer, escrow, verifier pipeline, audit log.
//! There is no global mutable state anywhere in the crate — anything
//! that looks like a singleton is a field here, built once at boot and
//! threaded through by reference. The HTTP layer holds an `Arc<ZeroId>`
//! and calls the methods below; tests construct the same object over a
//! temporary database.

use std::sync::Arc;
use thiserror::Error;

use crate::credential::CredentialStore;
use crate::crypto::eddsa::EddsaKeypair;
use crate::crypto::kdf::derive_store_key;
use crate::crypto::keys::RegulatorKeys;
use crate::escrow::{EscrowError, EscrowService, RotateOutcome};
use crate::issuer::{CredentialIssuer, IssuanceOutcome, IssuerError};
use crate::kyc::{KycProvider, KycSubmission};
use crate::records::{
    RecordError, Requirement, VerificationRecord, VerificationRecords, VerificationStatus,
};
use crate::sanctions::{SanctionsError, SanctionsList};
use crate::store::audit::AuditLog;
use crate::store::db::{DbError, ZeroIdDb};
use crate::store::encrypted::{EncryptedKv, StoreError};
use crate::verifier::{
    AggregateOutcome, NullifierRegistry, ProofPipeline, ProofSubmission, ProofVerifier,
    VerificationCache, VerifyError, VerifyOutcome,
};

/// Errors from service assembly and maintenance.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sanctions(#[from] SanctionsError),
}

/// The assembled service.
pub struct ZeroId {
    db: ZeroIdDb,
    issuer: CredentialIssuer,
    escrow: Arc<EscrowService>,
    pipeline: ProofPipeline,
    records: VerificationRecords,
    sanctions: Arc<SanctionsList>,
    regulators: Arc<RegulatorKeys>,
    audit: Arc<AuditLog>,
}

impl ZeroId {
    /// Wire the service together from its externally loaded inputs.
    ///
    /// `master_key` seeds the per-store HKDF; `verifier` is absent when
    /// no verification key was configured (proof routes then report
    /// unavailable instead of the process refusing to boot).
    pub fn assemble(
        db: ZeroIdDb,
        master_key: &[u8; 32],
        issuer_keypair: EddsaKeypair,
        regulators: Arc<RegulatorKeys>,
        provider: Arc<dyn KycProvider>,
        verifier: Option<Arc<ProofVerifier>>,
    ) -> Result<Self, ServiceError> {
        let audit = Arc::new(AuditLog::open(
            db.audit_tree().clone(),
            derive_store_key(master_key, "audit"),
        )?);

        let escrow = Arc::new(EscrowService::new(
            EncryptedKv::new(
                db.escrow_tree().clone(),
                derive_store_key(master_key, "escrow"),
                "escrow",
            ),
            Arc::clone(&audit),
        ));

        let sanctions = Arc::new(SanctionsList::with_defaults()?);

        let issuer = CredentialIssuer::new(
            Arc::new(issuer_keypair),
            Arc::clone(&sanctions),
            provider,
            Arc::clone(&escrow),
            CredentialStore::new(
                db.credentials_tree().clone(),
                derive_store_key(master_key, "credentials"),
            ),
            Arc::clone(&regulators),
            Arc::clone(&audit),
        );

        let pipeline = ProofPipeline::new(
            verifier,
            Arc::new(VerificationCache::new(EncryptedKv::new(
                db.proof_cache_tree().clone(),
                derive_store_key(master_key, "proof_cache"),
                "proof_cache",
            ))),
            Arc::new(NullifierRegistry::new(EncryptedKv::new(
                db.nullifiers_tree().clone(),
                derive_store_key(master_key, "nullifiers"),
                "nullifiers",
            ))),
            Arc::clone(&audit),
        );

        let records = VerificationRecords::new(EncryptedKv::new(
            db.verifications_tree().clone(),
            derive_store_key(master_key, "verifications"),
            "verifications",
        ));

        Ok(Self {
            db,
            issuer,
            escrow,
            pipeline,
            records,
            sanctions,
            regulators,
            audit,
        })
    }

    // -- Verification records ------------------------------------------------

    /// Open a verification request; starts `pending`.
    pub fn create_verification(
        &self,
        user_id: &str,
        requirements: Vec<Requirement>,
    ) -> Result<VerificationRecord, RecordError> {
        self.records.create(user_id, requirements)
    }

    /// Look up a verification record.
    pub fn get_verification(&self, id: &str) -> Result<Option<VerificationRecord>, RecordError> {
        self.records.get(id)
    }

    // -- Issuance ------------------------------------------------------------

    /// Issue a credential, optionally advancing a linked verification
    /// record through `kyc_processing` to `credential_issued` (or
    /// `failed` on any refusal).
    pub async fn issue_credential(
        &self,
        submission: KycSubmission,
        bound_address: Option<String>,
        level: Option<u8>,
        verification_id: Option<&str>,
    ) -> Result<IssuanceOutcome, IssuerError> {
        if let Some(id) = verification_id {
            // Best-effort record advancement; an unknown id does not
            // block issuance.
            let _ = self.records.transition(id, VerificationStatus::KycProcessing);
        }

        let result = self.issuer.issue(submission, bound_address, level).await;

        if let Some(id) = verification_id {
            match &result {
                Ok(outcome) => {
                    let _ = self
                        .records
                        .transition(id, VerificationStatus::CredentialIssued);
                    let _ = self.records.link_credential(id, &outcome.credential.id);
                }
                Err(_) => {
                    let _ = self.records.transition(id, VerificationStatus::Failed);
                }
            }
        }

        result
    }

    /// Bind an external address to a credential.
    pub fn bind_credential(&self, credential_id: &str, address: &str) -> Result<(), IssuerError> {
        self.issuer.bind_address(credential_id, address)
    }

    // -- Proof verification --------------------------------------------------

    /// Run one submission through the verification pipeline.
    pub async fn verify_proof(
        &self,
        submission: ProofSubmission,
    ) -> Result<VerifyOutcome, VerifyError> {
        self.pipeline.verify_submission(submission).await
    }

    /// Verify a batch with per-entry isolation.
    pub async fn aggregate_proofs(
        &self,
        entries: Vec<ProofSubmission>,
    ) -> Result<AggregateOutcome, VerifyError> {
        self.pipeline.aggregate(entries).await
    }

    /// Whether the Groth16 verifier is loaded.
    pub fn verifier_available(&self) -> bool {
        self.pipeline.available()
    }

    // -- Escrow maintenance --------------------------------------------------

    /// Handle an erasure request against an escrow entry.
    pub fn rotate_escrow(
        &self,
        escrow_id: &str,
        actor_id: &str,
        force: bool,
    ) -> Result<RotateOutcome, EscrowError> {
        self.escrow.rotate_escrow(escrow_id, actor_id, force)
    }

    /// Sweep expired escrow entries.
    pub fn purge_expired_escrow(&self) -> Result<usize, EscrowError> {
        self.escrow.purge_expired()
    }

    // -- Component access ----------------------------------------------------

    pub fn escrow(&self) -> &EscrowService {
        &self.escrow
    }

    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    pub fn pipeline(&self) -> &ProofPipeline {
        &self.pipeline
    }

    pub fn sanctions(&self) -> &SanctionsList {
        &self.sanctions
    }

    pub fn regulators(&self) -> &RegulatorKeys {
        &self.regulators
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Drain pending writes. Called on shutdown; all stores share the
    /// one sled handle, so one flush covers everything.
    pub fn flush(&self) -> Result<(), ServiceError> {
        self.db.flush()?;
        Ok(())
    }
}
