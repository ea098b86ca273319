//! # Encrypted PII Escrow
//!
//! The compliance half of the bargain: the user proves facts without
//! revealing attributes, but a regulator with the right key can still
//! open the raw KYC record for a specific credential. Entries are
//! encrypted twice — once under the regulator key (so the operator
//! cannot read them) and once under the escrow store key (so a stolen
//! disk reads as noise).
//!
//! The lifecycle is `active → invalidated | expired → purged`:
//!
//! - GDPR erasure requests inside the retention window are *deferred* —
//!   the legal hold wins until `expires_at`, and the caller gets the ISO
//!   deadline back;
//! - erasure after the window (or forced) is a **crypto-shred**: the
//!   regulator-layer blob is replaced with random bytes encrypted under
//!   a key that is generated, used once, and dropped on the floor. The
//!   ciphertext remains; nothing can ever open it again.
//! - `purge_expired` sweeps the store and force-shreds everything past
//!   its window.
//!
//! Every read re-checks `SHA-256(plaintext)` against the integrity hash
//! recorded at creation. A mismatch means the store or a key is
//! compromised; the caller gets an error, never the plaintext.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{retention_ms, AES_KEY_LENGTH};
use crate::crypto::encryption::{self, EncryptedBlob, EncryptionError};
use crate::crypto::hash::sha256_hex;
use crate::kyc::DocumentType;
use crate::store::audit::{metadata, AuditAction, AuditLog};
use crate::store::encrypted::{EncryptedKv, StoreError};

/// Marker written into `integrity_hash` after a crypto-shred.
const INVALIDATED_MARKER: &str = "INVALIDATED";

/// Size of the random filler written over a shredded blob.
const SHRED_FILLER_BYTES: usize = 256;

/// Errors from escrow operations, each state distinct.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("escrow entry not found: {0}")]
    NotFound(String),

    #[error("escrow entry invalidated: {0}")]
    Invalidated(String),

    #[error("escrow entry expired: {0}")]
    Expired(String),

    /// Decrypted plaintext does not match the recorded hash. Fatal;
    /// plaintext is never returned on this path.
    #[error("escrow integrity failure for {0}")]
    IntegrityFailure(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] EncryptionError),

    #[error("escrow serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// The raw PII record held in escrow: the submission plus the provider
/// outcome. Zeroizes its strings on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PiiRecord {
    pub full_name: String,
    pub date_of_birth: String,
    #[zeroize(skip)]
    pub country_code: u16,
    #[zeroize(skip)]
    pub document_type: DocumentType,
    pub document_number: String,
    pub provider_ref: String,
    #[zeroize(skip)]
    pub verified_at: i64,
}

impl std::fmt::Debug for PiiRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiiRecord").finish_non_exhaustive()
    }
}

/// The stored entry. The whole struct is wrapped again by the escrow
/// store envelope before it touches sled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEntry {
    /// PII encrypted under the regulator key.
    pub encrypted_blob: EncryptedBlob,
    pub regulator_key_id: String,
    pub credential_id: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// `created_at` + jurisdiction retention.
    pub expires_at: i64,
    pub invalidated: bool,
    /// `SHA-256(plaintext)` hex, or [`INVALIDATED_MARKER`] after a shred.
    pub integrity_hash: String,
}

/// Outcome of a rotate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotateOutcome {
    pub success: bool,
    /// Human-readable reason: the ISO retention deadline when deferred,
    /// or what happened when completed.
    pub reason: String,
}

/// The escrow service over its encrypted store and the audit log.
pub struct EscrowService {
    kv: EncryptedKv,
    audit: Arc<AuditLog>,
}

impl EscrowService {
    pub fn new(kv: EncryptedKv, audit: Arc<AuditLog>) -> Self {
        Self { kv, audit }
    }

    /// Create an escrow entry for a credential's raw PII.
    pub fn put_escrow(
        &self,
        escrow_id: &str,
        pii: &PiiRecord,
        regulator_key: &[u8; AES_KEY_LENGTH],
        regulator_key_id: &str,
        credential_id: &str,
        jurisdiction: &str,
    ) -> Result<(), EscrowError> {
        let mut plaintext = serde_json::to_vec(pii)?;
        let integrity_hash = sha256_hex(&plaintext);
        let encrypted_blob = encryption::encrypt(regulator_key, &plaintext)?;
        plaintext.zeroize();

        let now = chrono::Utc::now().timestamp_millis();
        let entry = EscrowEntry {
            encrypted_blob,
            regulator_key_id: regulator_key_id.to_string(),
            credential_id: credential_id.to_string(),
            created_at: now,
            expires_at: now + retention_ms(jurisdiction),
            invalidated: false,
            integrity_hash,
        };

        self.kv.put(escrow_id, &entry)?;
        self.audit.append(
            AuditAction::EscrowCreate,
            escrow_id,
            "system",
            metadata([
                ("regulator_key_id", regulator_key_id),
                ("jurisdiction", jurisdiction),
                ("credential_id", credential_id),
            ]),
        )?;

        tracing::debug!(escrow_id, credential_id, jurisdiction, "escrow entry created");
        Ok(())
    }

    /// Open an entry with the regulator key, verifying integrity.
    pub fn get_escrow(
        &self,
        escrow_id: &str,
        regulator_key: &[u8; AES_KEY_LENGTH],
        actor_id: &str,
    ) -> Result<PiiRecord, EscrowError> {
        let entry = self.load_active(escrow_id)?;

        self.audit.append(
            AuditAction::EscrowAccess,
            escrow_id,
            actor_id,
            metadata([("credential_id", &entry.credential_id)]),
        )?;

        let plaintext = encryption::decrypt(regulator_key, &entry.encrypted_blob)?;
        if sha256_hex(&plaintext) != entry.integrity_hash {
            tracing::error!(escrow_id, "escrow integrity hash mismatch");
            return Err(EscrowError::IntegrityFailure(escrow_id.to_string()));
        }

        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Handle an erasure request.
    ///
    /// Inside the retention window and not forced, the request is
    /// deferred and the outcome names the ISO deadline. Otherwise the
    /// regulator-layer blob is crypto-shredded in place.
    pub fn rotate_escrow(
        &self,
        escrow_id: &str,
        actor_id: &str,
        force_erasure: bool,
    ) -> Result<RotateOutcome, EscrowError> {
        let mut entry: EscrowEntry = self
            .kv
            .get(escrow_id)?
            .ok_or_else(|| EscrowError::NotFound(escrow_id.to_string()))?;

        if entry.invalidated {
            return Ok(RotateOutcome {
                success: true,
                reason: "already invalidated".to_string(),
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        if now < entry.expires_at && !force_erasure {
            let deadline = chrono::DateTime::from_timestamp_millis(entry.expires_at)
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| entry.expires_at.to_string());

            self.audit.append(
                AuditAction::EscrowRotate,
                escrow_id,
                actor_id,
                metadata([("result", "deferred"), ("deadline", &deadline)]),
            )?;

            return Ok(RotateOutcome {
                success: false,
                reason: format!("retention holds until {deadline}"),
            });
        }

        // Crypto-shred: random bytes under a single-use key. The key
        // goes out of scope right here, which is the entire point.
        let mut shred_key = [0u8; AES_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut shred_key);
        let mut filler = [0u8; SHRED_FILLER_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut filler);

        entry.encrypted_blob = encryption::encrypt(&shred_key, &filler)?;
        entry.invalidated = true;
        entry.integrity_hash = INVALIDATED_MARKER.to_string();
        shred_key.zeroize();

        self.kv.put(escrow_id, &entry)?;
        self.audit.append(
            AuditAction::EscrowRotate,
            escrow_id,
            actor_id,
            metadata([("result", "completed")]),
        )?;

        tracing::info!(escrow_id, "escrow entry crypto-shredded");
        Ok(RotateOutcome {
            success: true,
            reason: "crypto-shredded".to_string(),
        })
    }

    /// Sweep the store and shred every entry past its retention window.
    /// Returns the number of entries purged.
    pub fn purge_expired(&self) -> Result<usize, EscrowError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut purged = 0usize;

        for escrow_id in self.kv.keys()? {
            let Some(entry) = self.kv.get::<EscrowEntry>(&escrow_id)? else {
                continue;
            };
            if entry.invalidated || now < entry.expires_at {
                continue;
            }

            self.rotate_escrow(&escrow_id, "system", true)?;
            self.audit.append(
                AuditAction::EscrowPurge,
                &escrow_id,
                "system",
                metadata([("credential_id", &entry.credential_id)]),
            )?;
            purged += 1;
        }

        if purged > 0 {
            tracing::info!(purged, "retention purge complete");
        }
        Ok(purged)
    }

    /// Presence check against the keyspace — never a trial decryption.
    pub fn exists(&self, escrow_id: &str) -> Result<bool, EscrowError> {
        Ok(self.kv.contains(escrow_id)?)
    }

    /// Integrity check without returning plaintext: decrypt and compare
    /// the recorded hash. Maintenance/ops support.
    pub fn integrity_check(
        &self,
        escrow_id: &str,
        regulator_key: &[u8; AES_KEY_LENGTH],
    ) -> Result<bool, EscrowError> {
        let entry = self.load_active(escrow_id)?;
        let plaintext = encryption::decrypt(regulator_key, &entry.encrypted_blob)?;
        Ok(sha256_hex(&plaintext) == entry.integrity_hash)
    }

    /// Load an entry that must be active: present, not invalidated, not
    /// past retention. Each failure mode is its own error.
    fn load_active(&self, escrow_id: &str) -> Result<EscrowEntry, EscrowError> {
        let entry: EscrowEntry = self
            .kv
            .get(escrow_id)?
            .ok_or_else(|| EscrowError::NotFound(escrow_id.to_string()))?;

        if entry.invalidated {
            return Err(EscrowError::Invalidated(escrow_id.to_string()));
        }
        // An entry expiring exactly now is already expired.
        if chrono::Utc::now().timestamp_millis() >= entry.expires_at {
            return Err(EscrowError::Expired(escrow_id.to_string()));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::ZeroIdDb;

    const REGULATOR_KEY: [u8; 32] = [0x42u8; 32];

    fn service() -> (ZeroIdDb, EscrowService, Arc<AuditLog>) {
        let db = ZeroIdDb::open_temporary().unwrap();
        let kv = EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow");
        let audit = Arc::new(AuditLog::open(db.audit_tree().clone(), [2u8; 32]).unwrap());
        let escrow = EscrowService::new(kv, Arc::clone(&audit));
        (db, escrow, audit)
    }

    fn pii() -> PiiRecord {
        PiiRecord {
            full_name: "Alice Ng".into(),
            date_of_birth: "1990-01-15".into(),
            country_code: 840,
            document_type: DocumentType::Passport,
            document_number: "X123".into(),
            provider_ref: "mock-ref".into(),
            verified_at: 1_700_000_000_000,
        }
    }

    fn put(escrow: &EscrowService, id: &str) {
        escrow
            .put_escrow(id, &pii(), &REGULATOR_KEY, "default", "cred-1", "US")
            .unwrap();
    }

    #[test]
    fn put_get_roundtrip() {
        let (_db, escrow, _) = service();
        put(&escrow, "e-1");

        let recovered = escrow.get_escrow("e-1", &REGULATOR_KEY, "regulator-1").unwrap();
        assert_eq!(recovered.full_name, "Alice Ng");
        assert_eq!(recovered.document_number, "X123");
        assert_eq!(recovered.country_code, 840);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let (_db, escrow, _) = service();
        assert!(matches!(
            escrow.get_escrow("absent", &REGULATOR_KEY, "r"),
            Err(EscrowError::NotFound(_))
        ));
        assert!(!escrow.exists("absent").unwrap());
    }

    #[test]
    fn wrong_regulator_key_fails_closed() {
        let (_db, escrow, _) = service();
        put(&escrow, "e-1");
        let wrong = [0x43u8; 32];
        assert!(matches!(
            escrow.get_escrow("e-1", &wrong, "r"),
            Err(EscrowError::Crypto(_))
        ));
    }

    #[test]
    fn retention_is_five_years_out() {
        let (db, escrow, _) = service();
        put(&escrow, "e-1");

        let kv = EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow");
        let entry: EscrowEntry = kv.get("e-1").unwrap().unwrap();
        assert_eq!(entry.expires_at - entry.created_at, retention_ms("US"));
        assert!(!entry.invalidated);
        assert_ne!(entry.integrity_hash, INVALIDATED_MARKER);
    }

    #[test]
    fn rotate_inside_retention_is_deferred() {
        let (_db, escrow, audit) = service();
        put(&escrow, "e-1");

        let outcome = escrow.rotate_escrow("e-1", "user-1", false).unwrap();
        assert!(!outcome.success);
        assert!(outcome.reason.contains("retention holds until"));
        // ISO deadline in the reason: contains a date separator and a T.
        assert!(outcome.reason.contains('T'));

        // Entry is still readable after a deferred rotate.
        assert!(escrow.get_escrow("e-1", &REGULATOR_KEY, "r").is_ok());

        let entries = audit.entries().unwrap();
        let rotate = entries
            .iter()
            .find(|(_, e)| e.action == AuditAction::EscrowRotate)
            .unwrap();
        assert_eq!(rotate.1.metadata["result"], "deferred");
    }

    #[test]
    fn forced_rotate_shreds_and_invalidated_reads_fail_distinctly() {
        let (_db, escrow, audit) = service();
        put(&escrow, "e-1");

        let outcome = escrow.rotate_escrow("e-1", "user-1", true).unwrap();
        assert!(outcome.success);

        // Invalidated, not "not found".
        assert!(matches!(
            escrow.get_escrow("e-1", &REGULATOR_KEY, "r"),
            Err(EscrowError::Invalidated(_))
        ));
        assert!(escrow.exists("e-1").unwrap());

        let entries = audit.entries().unwrap();
        let completed = entries
            .iter()
            .filter(|(_, e)| {
                e.action == AuditAction::EscrowRotate
                    && e.metadata.get("result").map(String::as_str) == Some("completed")
            })
            .count();
        assert_eq!(completed, 1);
    }

    #[test]
    fn rotate_twice_is_idempotent() {
        let (_db, escrow, _) = service();
        put(&escrow, "e-1");
        escrow.rotate_escrow("e-1", "u", true).unwrap();
        let again = escrow.rotate_escrow("e-1", "u", true).unwrap();
        assert!(again.success);
        assert_eq!(again.reason, "already invalidated");
    }

    #[test]
    fn expired_entry_reads_as_expired_and_purges() {
        let (db, escrow, audit) = service();
        put(&escrow, "e-1");
        put(&escrow, "e-2");

        // Rewind e-1's window so it expires exactly now.
        let kv = EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow");
        let mut entry: EscrowEntry = kv.get("e-1").unwrap().unwrap();
        entry.expires_at = chrono::Utc::now().timestamp_millis();
        kv.put("e-1", &entry).unwrap();

        assert!(matches!(
            escrow.get_escrow("e-1", &REGULATOR_KEY, "r"),
            Err(EscrowError::Expired(_))
        ));

        let purged = escrow.purge_expired().unwrap();
        assert_eq!(purged, 1);
        assert_eq!(audit.count_by_action(AuditAction::EscrowPurge).unwrap(), 1);

        // e-2 is untouched; e-1 is now invalidated.
        assert!(escrow.get_escrow("e-2", &REGULATOR_KEY, "r").is_ok());
        assert!(matches!(
            escrow.get_escrow("e-1", &REGULATOR_KEY, "r"),
            Err(EscrowError::Invalidated(_))
        ));

        // A second sweep finds nothing.
        assert_eq!(escrow.purge_expired().unwrap(), 0);
    }

    #[test]
    fn audit_create_count_matches_put_count() {
        let (_db, escrow, audit) = service();
        for i in 0..4 {
            put(&escrow, &format!("e-{i}"));
        }
        assert_eq!(audit.count_by_action(AuditAction::EscrowCreate).unwrap(), 4);
    }

    #[test]
    fn access_is_audited() {
        let (_db, escrow, audit) = service();
        put(&escrow, "e-1");
        escrow.get_escrow("e-1", &REGULATOR_KEY, "regulator-7").unwrap();

        let entries = audit.entries().unwrap();
        let access = entries
            .iter()
            .find(|(_, e)| e.action == AuditAction::EscrowAccess)
            .unwrap();
        assert_eq!(access.1.actor, "regulator-7");
        assert_eq!(access.1.resource_id, "e-1");
    }

    #[test]
    fn audit_metadata_has_no_pii() {
        let (_db, escrow, audit) = service();
        put(&escrow, "e-1");
        for (_, entry) in audit.entries().unwrap() {
            let json = serde_json::to_string(&entry).unwrap();
            assert!(!json.contains("Alice"));
            assert!(!json.contains("X123"));
            assert!(!json.contains("1990-01-15"));
        }
    }

    #[test]
    fn tampered_integrity_hash_is_fatal() {
        let (db, escrow, _) = service();
        put(&escrow, "e-1");

        let kv = EncryptedKv::new(db.escrow_tree().clone(), [1u8; 32], "escrow");
        let mut entry: EscrowEntry = kv.get("e-1").unwrap().unwrap();
        entry.integrity_hash = sha256_hex(b"somebody else's plaintext");
        kv.put("e-1", &entry).unwrap();

        assert!(matches!(
            escrow.get_escrow("e-1", &REGULATOR_KEY, "r"),
            Err(EscrowError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn integrity_check_passes_on_healthy_entry() {
        let (_db, escrow, _) = service();
        put(&escrow, "e-1");
        assert!(escrow.integrity_check("e-1", &REGULATOR_KEY).unwrap());
    }

    #[test]
    fn double_encryption_hides_pii_from_single_key_holder() {
        // The raw sled value must reveal nothing even to someone holding
        // only the regulator key: the store layer wraps the entry again.
        let (db, escrow, _) = service();
        put(&escrow, "e-1");

        let raw = db.escrow_tree().get(b"e-1").unwrap().unwrap();
        let raw_str = String::from_utf8_lossy(&raw);
        assert!(!raw_str.contains("Alice"));
        assert!(!raw_str.contains("cred-1"));
        assert!(!raw_str.contains("integrity_hash"));
    }
}
