//! # Credential Issuance Pipeline
//!
//! The orchestration that turns a KYC submission into a signed
//! credential: sanctions screen → provider verification → commitment →
//! signature → escrow → persistence. Ordering is deliberate and
//! rollback-aware:
//!
//! 1. the escrow entry is written **before** the credential document, so
//!    a crash can leave an orphaned escrow (harmless — retention purges
//!    it) but never a credential without its compliance record;
//! 2. if the credential write fails, the freshly written escrow entry is
//!    force-shredded before the error surfaces.
//!
//! Plaintext PII exists only inside [`CredentialIssuer::issue`]'s frame;
//! the submission and the derived escrow record both zeroize on drop,
//! and the user secret leaves in the returned credential and nowhere
//! else.

use ark_bn254::Fr;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{MAX_COUNTRY_CODE, MIN_COUNTRY_CODE, USER_SECRET_BYTES};
use crate::credential::{
    current_age, derive_level, CredentialError, CredentialStore, SignedCredential,
};
use crate::crypto::eddsa::{EddsaError, EddsaKeypair};
use crate::crypto::field::fr_from_random_bytes;
use crate::crypto::keys::{KeyError, RegulatorKeys};
use crate::crypto::poseidon::{poseidon3, PoseidonError};
use crate::escrow::{EscrowError, EscrowService, PiiRecord};
use crate::kyc::{KycError, KycProvider, KycSubmission};
use crate::sanctions::SanctionsList;
use crate::store::audit::{metadata, AuditAction, AuditLog};
use crate::store::encrypted::StoreError;

/// The regulator whose key wraps escrow entries when the caller names
/// none. Multi-regulator routing keys off jurisdiction in deployments
/// that need it.
const DEFAULT_REGULATOR_ID: &str = "default";

/// Jurisdiction applied to escrow retention at issuance.
const ISSUANCE_JURISDICTION: &str = "US";

/// Errors from the issuance pipeline, in policy order.
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("country {0} is sanctioned")]
    Sanctioned(u16),

    #[error("country code {0} outside ISO 3166-1 numeric range")]
    InvalidCountryCode(u16),

    /// The provider ran and said no. Carries the confidence so the
    /// caller can surface it.
    #[error("kyc verification failed (confidence {confidence})")]
    KycRejected { confidence: f64 },

    #[error(transparent)]
    Kyc(#[from] KycError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error(transparent)]
    Poseidon(#[from] PoseidonError),

    #[error(transparent)]
    Eddsa(#[from] EddsaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What issuance hands back: the credential (with the user secret, for
/// its single trip over TLS) and the escrow id.
#[derive(Debug)]
pub struct IssuanceOutcome {
    pub credential: SignedCredential,
    pub escrow_id: String,
}

/// The issuance orchestrator.
pub struct CredentialIssuer {
    keypair: Arc<EddsaKeypair>,
    sanctions: Arc<SanctionsList>,
    provider: Arc<dyn KycProvider>,
    escrow: Arc<EscrowService>,
    credentials: CredentialStore,
    regulators: Arc<RegulatorKeys>,
    audit: Arc<AuditLog>,
}

impl CredentialIssuer {
    pub fn new(
        keypair: Arc<EddsaKeypair>,
        sanctions: Arc<SanctionsList>,
        provider: Arc<dyn KycProvider>,
        escrow: Arc<EscrowService>,
        credentials: CredentialStore,
        regulators: Arc<RegulatorKeys>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            keypair,
            sanctions,
            provider,
            escrow,
            credentials,
            regulators,
            audit,
        }
    }

    /// Run the full issuance pipeline for one submission.
    pub async fn issue(
        &self,
        submission: KycSubmission,
        bound_address: Option<String>,
        requested_level: Option<u8>,
    ) -> Result<IssuanceOutcome, IssuerError> {
        let country = submission.country_code;
        if !(MIN_COUNTRY_CODE..=MAX_COUNTRY_CODE).contains(&country) {
            return Err(IssuerError::InvalidCountryCode(country));
        }

        // Policy gate 1: sanctions. Cheap, local, runs before any PII
        // leaves the process.
        if self.sanctions.is_sanctioned(country) {
            tracing::warn!(country, "issuance refused: sanctioned country");
            return Err(IssuerError::Sanctioned(country));
        }

        // Policy gate 2: the KYC provider.
        let kyc = self.provider.verify(&submission).await?;
        if !kyc.passed {
            return Err(IssuerError::KycRejected {
                confidence: kyc.confidence,
            });
        }

        // Commitment inputs: age from the wall clock, a fresh secret.
        let age = current_age(submission.parsed_date_of_birth()?)?;
        let mut secret_bytes = [0u8; USER_SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut secret_bytes);
        let user_secret = fr_from_random_bytes(&secret_bytes);
        secret_bytes.iter_mut().for_each(|b| *b = 0);

        let credential_hash = poseidon3(Fr::from(age as u64), Fr::from(country as u64), user_secret)?;
        let signature = self.keypair.sign_poseidon(credential_hash)?;
        let level = derive_level(requested_level, age, country)?;

        let credential_id = Uuid::new_v4().to_string();
        let escrow_id = Uuid::new_v4().to_string();
        let issued_at = chrono::Utc::now().timestamp_millis();

        let credential = SignedCredential {
            id: credential_id.clone(),
            user_secret,
            credential_hash,
            signature,
            issuer_pub_key: self.keypair.public_key(),
            bound_address,
            level,
            issued_at,
            expires_at: SignedCredential::default_expiry(issued_at),
        };

        // Escrow first. The PII record is consumed (and zeroized) here;
        // after this call the submission is the only plaintext copy left,
        // and it drops with this frame.
        let regulator_key = self.regulators.get(DEFAULT_REGULATOR_ID)?;
        let pii = PiiRecord {
            full_name: submission.full_name.clone(),
            date_of_birth: submission.date_of_birth.clone(),
            country_code: country,
            document_type: submission.document_type,
            document_number: submission.document_number.clone(),
            provider_ref: kyc.provider_ref.clone(),
            verified_at: kyc.verified_at,
        };
        self.escrow.put_escrow(
            &escrow_id,
            &pii,
            &regulator_key,
            DEFAULT_REGULATOR_ID,
            &credential_id,
            ISSUANCE_JURISDICTION,
        )?;
        drop(pii);

        // Credential document second. If this write fails we shred the
        // escrow entry we just created before surfacing the error.
        if let Err(e) = self.credentials.put(&credential) {
            tracing::error!(%credential_id, "credential write failed; rolling back escrow");
            if let Err(rollback) = self.escrow.rotate_escrow(&escrow_id, "system", true) {
                // Rollback failure is logged, not fatal on top of fatal:
                // retention will purge the orphan.
                tracing::error!(%escrow_id, error = %rollback, "escrow rollback failed");
            }
            return Err(e.into());
        }

        self.audit.append(
            AuditAction::CredentialIssue,
            &credential_id,
            "system",
            metadata([
                ("level", &level.to_string()),
                ("escrow_id", &escrow_id),
                ("provider_ref", &kyc.provider_ref),
            ]),
        )?;

        tracing::info!(%credential_id, level, "credential issued");
        Ok(IssuanceOutcome {
            credential,
            escrow_id,
        })
    }

    /// Bind an external account address to an issued credential.
    pub fn bind_address(&self, credential_id: &str, address: &str) -> Result<(), IssuerError> {
        self.credentials.bind_address(credential_id, address)?;
        self.audit.append(
            AuditAction::CredentialBind,
            credential_id,
            "system",
            metadata([("address", address)]),
        )?;
        Ok(())
    }

    /// Read-only access to the credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::eddsa::verify_poseidon;
    use crate::kyc::{DocumentType, MockKycProvider};
    use crate::store::db::ZeroIdDb;
    use crate::store::encrypted::EncryptedKv;

    const REGULATOR_KEY: [u8; 32] = [0x21u8; 32];

    struct Fixture {
        db: ZeroIdDb,
        issuer: CredentialIssuer,
        escrow: Arc<EscrowService>,
        audit: Arc<AuditLog>,
    }

    fn fixture() -> Fixture {
        let db = ZeroIdDb::open_temporary().unwrap();
        let audit = Arc::new(AuditLog::open(db.audit_tree().clone(), [2u8; 32]).unwrap());
        let escrow = Arc::new(EscrowService::new(
            EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow"),
            Arc::clone(&audit),
        ));
        let regulators = Arc::new(RegulatorKeys::new());
        regulators.insert(DEFAULT_REGULATOR_ID, REGULATOR_KEY);

        let issuer = CredentialIssuer::new(
            Arc::new(EddsaKeypair::from_seed(&[7u8; 32])),
            Arc::new(SanctionsList::with_defaults().unwrap()),
            Arc::new(MockKycProvider),
            Arc::clone(&escrow),
            CredentialStore::new(db.credentials_tree().clone(), [3u8; 32]),
            regulators,
            Arc::clone(&audit),
        );

        Fixture {
            db,
            issuer,
            escrow,
            audit,
        }
    }

    fn submission(name: &str, country: u16) -> KycSubmission {
        KycSubmission {
            full_name: name.to_string(),
            date_of_birth: "1990-01-15".to_string(),
            country_code: country,
            document_type: DocumentType::Passport,
            document_number: "X123".to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_issues_and_persists() {
        let fx = fixture();
        let outcome = fx
            .issuer
            .issue(submission("Alice Ng", 840), None, None)
            .await
            .unwrap();

        // Level 3: both age and country verified.
        assert_eq!(outcome.credential.level, 3);

        // The signature verifies under the issuer key.
        assert!(verify_poseidon(
            &outcome.credential.issuer_pub_key,
            outcome.credential.credential_hash,
            &outcome.credential.signature,
        )
        .unwrap());

        // The hash is reproducible from (age, country, secret).
        let age = current_age(
            chrono::NaiveDate::parse_from_str("1990-01-15", "%Y-%m-%d").unwrap(),
        )
        .unwrap();
        let recomputed = poseidon3(
            Fr::from(age as u64),
            Fr::from(840u64),
            outcome.credential.user_secret,
        )
        .unwrap();
        assert_eq!(recomputed, outcome.credential.credential_hash);

        // Credential document and escrow entry both landed.
        let record = fx.issuer.credentials().get(&outcome.credential.id).unwrap();
        assert!(record.is_some());
        assert!(fx.escrow.exists(&outcome.escrow_id).unwrap());

        // Escrow opens with the regulator key and holds the submission.
        let pii = fx
            .escrow
            .get_escrow(&outcome.escrow_id, &REGULATOR_KEY, "test")
            .unwrap();
        assert_eq!(pii.full_name, "Alice Ng");
        assert!(pii.provider_ref.starts_with("mock-"));

        assert_eq!(
            fx.audit.count_by_action(AuditAction::CredentialIssue).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn sanctioned_country_refused_with_no_writes() {
        let fx = fixture();
        let result = fx.issuer.issue(submission("Alice Ng", 408), None, None).await;
        assert!(matches!(result, Err(IssuerError::Sanctioned(408))));

        // Nothing persisted anywhere.
        assert_eq!(fx.db.credentials_tree().len(), 0);
        assert_eq!(fx.db.escrow_tree().len(), 0);
        assert_eq!(
            fx.audit.count_by_action(AuditAction::EscrowCreate).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn kyc_rejection_carries_confidence() {
        let fx = fixture();
        let result = fx.issuer.issue(submission("REJECT ME", 840), None, None).await;
        match result {
            Err(IssuerError::KycRejected { confidence }) => {
                assert!((confidence - 0.15).abs() < f64::EPSILON);
            }
            other => panic!("expected KycRejected, got {other:?}"),
        }
        assert_eq!(fx.db.credentials_tree().len(), 0);
        assert_eq!(fx.db.escrow_tree().len(), 0);
    }

    #[tokio::test]
    async fn invalid_country_code_rejected() {
        let fx = fixture();
        assert!(matches!(
            fx.issuer.issue(submission("Alice Ng", 0), None, None).await,
            Err(IssuerError::InvalidCountryCode(0))
        ));
    }

    #[tokio::test]
    async fn caller_level_and_bound_address_respected() {
        let fx = fixture();
        let address = "0x00112233445566778899aabbccddeeff00112233".to_string();
        let outcome = fx
            .issuer
            .issue(submission("Alice Ng", 840), Some(address.clone()), Some(2))
            .await
            .unwrap();

        assert_eq!(outcome.credential.level, 2);
        assert_eq!(outcome.credential.bound_address.as_deref(), Some(address.as_str()));

        let record = fx
            .issuer
            .credentials()
            .get(&outcome.credential.id)
            .unwrap()
            .unwrap();
        assert_eq!(record.bound_address.as_deref(), Some(address.as_str()));
    }

    #[tokio::test]
    async fn user_secrets_are_unique_per_issuance() {
        let fx = fixture();
        let a = fx
            .issuer
            .issue(submission("Alice Ng", 840), None, None)
            .await
            .unwrap();
        let b = fx
            .issuer
            .issue(submission("Alice Ng", 840), None, None)
            .await
            .unwrap();
        assert_ne!(a.credential.user_secret, b.credential.user_secret);
        assert_ne!(a.credential.credential_hash, b.credential.credential_hash);
    }

    #[tokio::test]
    async fn bind_address_audits() {
        let fx = fixture();
        let outcome = fx
            .issuer
            .issue(submission("Alice Ng", 840), None, None)
            .await
            .unwrap();

        fx.issuer
            .bind_address(
                &outcome.credential.id,
                "0xffeeddccbbaa99887766554433221100ffeeddcc",
            )
            .unwrap();

        assert_eq!(
            fx.audit.count_by_action(AuditAction::CredentialBind).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn missing_regulator_key_fails_before_any_write() {
        let db = ZeroIdDb::open_temporary().unwrap();
        let audit = Arc::new(AuditLog::open(db.audit_tree().clone(), [2u8; 32]).unwrap());
        let escrow = Arc::new(EscrowService::new(
            EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow"),
            Arc::clone(&audit),
        ));
        // No key registered for "default", and no env var either.
        let issuer = CredentialIssuer::new(
            Arc::new(EddsaKeypair::from_seed(&[7u8; 32])),
            Arc::new(SanctionsList::with_defaults().unwrap()),
            Arc::new(MockKycProvider),
            escrow,
            CredentialStore::new(db.credentials_tree().clone(), [3u8; 32]),
            Arc::new(RegulatorKeys::new()),
            audit,
        );

        let result = issuer.issue(submission("Alice Ng", 840), None, None).await;
        assert!(matches!(result, Err(IssuerError::Keys(_))));
        assert_eq!(db.escrow_tree().len(), 0);
        assert_eq!(db.credentials_tree().len(), 0);
    }
}
