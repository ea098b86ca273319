//! # Verification Records
//!
//! The server-side view of a verification request as it moves through
//! the pipeline. The state machine is strict — a record can only move
//! along the arrows below, and `verified`/`failed` are terminal:
//!
//! ```text
//! pending → kyc_processing → credential_issued → proof_generating
//!         → proof_ready → verified
//! (any non-terminal state) → failed
//! ```
//!
//! Records are stored in the encrypted `verifications` store; the public
//! lookup endpoint serves them by id.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::encrypted::{EncryptedKv, StoreError};

/// Errors from record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("verification record not found: {0}")]
    NotFound(String),

    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: VerificationStatus,
        to: VerificationStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lifecycle states for a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    KycProcessing,
    CredentialIssued,
    ProofGenerating,
    ProofReady,
    Verified,
    Failed,
}

impl VerificationStatus {
    /// Whether the machine accepts a move from `self` to `next`.
    pub fn can_transition_to(self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;
        match (self, next) {
            (Pending, KycProcessing)
            | (KycProcessing, CredentialIssued)
            | (CredentialIssued, ProofGenerating)
            | (ProofGenerating, ProofReady)
            | (ProofReady, Verified) => true,
            // Any non-terminal state may fail.
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// `verified` and `failed` are the only terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, VerificationStatus::Verified | VerificationStatus::Failed)
    }
}

/// Predicate kinds an application can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    AgeGte,
    CountryNot,
    SanctionsClear,
    SybilUnique,
}

/// One requirement: a predicate kind plus its parameter (a threshold
/// age, a country code, an app id — shape depends on the kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(rename = "type")]
    pub kind: RequirementType,
    pub value: serde_json::Value,
}

/// A verification request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: String,
    pub user_id: String,
    pub requirements: Vec<Requirement>,
    pub status: VerificationStatus,
    /// Set once issuance links a credential to this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Store of verification records.
pub struct VerificationRecords {
    kv: EncryptedKv,
}

impl VerificationRecords {
    pub fn new(kv: EncryptedKv) -> Self {
        Self { kv }
    }

    /// Create a new record in `pending`.
    pub fn create(
        &self,
        user_id: &str,
        requirements: Vec<Requirement>,
    ) -> Result<VerificationRecord, RecordError> {
        let now = chrono::Utc::now().timestamp_millis();
        let record = VerificationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            requirements,
            status: VerificationStatus::Pending,
            credential_id: None,
            created_at: now,
            updated_at: now,
        };
        self.kv.put(&record.id, &record)?;
        Ok(record)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Result<Option<VerificationRecord>, RecordError> {
        Ok(self.kv.get(id)?)
    }

    /// Move a record to `next`, enforcing the state machine.
    pub fn transition(
        &self,
        id: &str,
        next: VerificationStatus,
    ) -> Result<VerificationRecord, RecordError> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;

        if !record.status.can_transition_to(next) {
            return Err(RecordError::IllegalTransition {
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        record.updated_at = chrono::Utc::now().timestamp_millis();
        self.kv.put(id, &record)?;
        Ok(record)
    }

    /// Attach the issued credential id to a record.
    pub fn link_credential(
        &self,
        id: &str,
        credential_id: &str,
    ) -> Result<VerificationRecord, RecordError> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        record.credential_id = Some(credential_id.to_string());
        record.updated_at = chrono::Utc::now().timestamp_millis();
        self.kv.put(id, &record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::ZeroIdDb;

    fn records() -> (ZeroIdDb, VerificationRecords) {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.verifications_tree().clone(), [4u8; 32], "verifications");
        (db, VerificationRecords::new(kv))
    }

    fn age_requirement() -> Vec<Requirement> {
        vec![Requirement {
            kind: RequirementType::AgeGte,
            value: serde_json::json!(18),
        }]
    }

    #[test]
    fn create_starts_pending() {
        let (_db, records) = records();
        let record = records.create("user-1", age_requirement()).unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert!(record.credential_id.is_none());

        let fetched = records.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.user_id, "user-1");
    }

    #[test]
    fn happy_path_transitions() {
        let (_db, records) = records();
        let record = records.create("user-1", age_requirement()).unwrap();

        use VerificationStatus::*;
        for next in [KycProcessing, CredentialIssued, ProofGenerating, ProofReady, Verified] {
            let updated = records.transition(&record.id, next).unwrap();
            assert_eq!(updated.status, next);
        }
    }

    #[test]
    fn skipping_states_is_illegal() {
        let (_db, records) = records();
        let record = records.create("user-1", age_requirement()).unwrap();

        assert!(matches!(
            records.transition(&record.id, VerificationStatus::Verified),
            Err(RecordError::IllegalTransition { .. })
        ));
        assert!(matches!(
            records.transition(&record.id, VerificationStatus::ProofReady),
            Err(RecordError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn any_active_state_may_fail() {
        let (_db, records) = records();
        use VerificationStatus::*;

        let record = records.create("u", age_requirement()).unwrap();
        records.transition(&record.id, Failed).unwrap();

        let record = records.create("u", age_requirement()).unwrap();
        records.transition(&record.id, KycProcessing).unwrap();
        records.transition(&record.id, CredentialIssued).unwrap();
        records.transition(&record.id, Failed).unwrap();
    }

    #[test]
    fn terminal_states_are_sticky() {
        let (_db, records) = records();
        use VerificationStatus::*;

        let record = records.create("u", age_requirement()).unwrap();
        records.transition(&record.id, Failed).unwrap();

        for next in [Pending, KycProcessing, Verified, Failed] {
            assert!(matches!(
                records.transition(&record.id, next),
                Err(RecordError::IllegalTransition { .. })
            ));
        }
    }

    #[test]
    fn unknown_record_is_not_found() {
        let (_db, records) = records();
        assert!(matches!(
            records.transition("nope", VerificationStatus::Failed),
            Err(RecordError::NotFound(_))
        ));
        assert!(records.get("nope").unwrap().is_none());
    }

    #[test]
    fn link_credential_sets_id() {
        let (_db, records) = records();
        let record = records.create("u", age_requirement()).unwrap();
        let linked = records.link_credential(&record.id, "cred-9").unwrap();
        assert_eq!(linked.credential_id.as_deref(), Some("cred-9"));
    }

    #[test]
    fn requirement_wire_shape() {
        let requirement = Requirement {
            kind: RequirementType::AgeGte,
            value: serde_json::json!(21),
        };
        let json = serde_json::to_value(&requirement).unwrap();
        assert_eq!(json["type"], "age_gte");
        assert_eq!(json["value"], 21);

        let parsed: Requirement =
            serde_json::from_value(serde_json::json!({"type": "sybil_unique", "value": "app-1"}))
                .unwrap();
        assert_eq!(parsed.kind, RequirementType::SybilUnique);
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::KycProcessing).unwrap(),
            "\"kyc_processing\""
        );
        assert_eq!(
            serde_json::to_string(&VerificationStatus::ProofReady).unwrap(),
            "\"proof_ready\""
        );
    }
}
