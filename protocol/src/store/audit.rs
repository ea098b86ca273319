//! # Append-Only Audit Log
//!
//! Every compliance-relevant action lands here: escrow lifecycle events,
//! credential issuance and binding, proof verifications, nullifier
//! registrations. Entries are store-encrypted like everything else and
//! keyed by a monotonically increasing big-endian sequence number, so
//! sled's lexicographic iteration returns them in append order.
//!
//! Two rules, both load-bearing:
//!
//! - entries are never updated or deleted — the log only grows;
//! - metadata is a flat string map and carries NO PII. Regulator key
//!   ids, jurisdictions, credential ids: yes. Names, birthdays,
//!   document numbers: absolutely not.

use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AES_KEY_LENGTH;
use crate::store::encrypted::StoreError;

/// The closed set of auditable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EscrowCreate,
    EscrowAccess,
    EscrowRotate,
    EscrowPurge,
    CredentialIssue,
    CredentialBind,
    ProofVerify,
    NullifierRegister,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub action: AuditAction,
    /// The id of the thing acted on (escrow id, credential id, nullifier…).
    pub resource_id: String,
    /// Who performed the action — an API key label, "system", or a
    /// regulator actor id. Never an end user's identity.
    pub actor: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Flat, PII-free context.
    pub metadata: BTreeMap<String, String>,
}

/// The append-only log over the `audit` tree.
pub struct AuditLog {
    tree: Tree,
    key: [u8; AES_KEY_LENGTH],
    /// Next sequence number. Initialized from the last persisted key so
    /// the ordering survives restarts; `fetch_add` hands concurrent
    /// appenders distinct positions.
    next_seq: AtomicU64,
}

impl AuditLog {
    /// Open the log over its tree, resuming the sequence from disk.
    pub fn open(tree: Tree, key: [u8; AES_KEY_LENGTH]) -> Result<Self, StoreError> {
        let next_seq = match tree.last()? {
            Some((last_key, _)) => {
                let bytes: [u8; 8] = last_key.as_ref().try_into().map_err(|_| {
                    StoreError::Corrupt {
                        key: hex::encode(&last_key),
                        reason: "audit key is not an 8-byte sequence".into(),
                    }
                })?;
                u64::from_be_bytes(bytes) + 1
            }
            None => 0,
        };

        Ok(Self {
            tree,
            key,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// Append an entry, returning its sequence position.
    pub fn append(
        &self,
        action: AuditAction,
        resource_id: &str,
        actor: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<u64, StoreError> {
        let entry = AuditLogEntry {
            action,
            resource_id: resource_id.to_string(),
            actor: actor.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata,
        };

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let plaintext = serde_json::to_vec(&entry)?;
        let blob = crate::crypto::encryption::encrypt(&self.key, &plaintext).map_err(|source| {
            StoreError::Integrity {
                key: seq.to_string(),
                source,
            }
        })?;

        self.tree
            .insert(seq.to_be_bytes(), serde_json::to_vec(&blob)?)?;
        Ok(seq)
    }

    /// All entries in append order.
    pub fn entries(&self) -> Result<Vec<(u64, AuditLogEntry)>, StoreError> {
        let mut out = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (k, v) = item?;
            let bytes: [u8; 8] = k.as_ref().try_into().map_err(|_| StoreError::Corrupt {
                key: hex::encode(&k),
                reason: "audit key is not an 8-byte sequence".into(),
            })?;
            let seq = u64::from_be_bytes(bytes);

            let blob: crate::crypto::encryption::EncryptedBlob =
                serde_json::from_slice(&v).map_err(|e| StoreError::Corrupt {
                    key: seq.to_string(),
                    reason: e.to_string(),
                })?;
            let plaintext = crate::crypto::encryption::decrypt(&self.key, &blob).map_err(
                |source| StoreError::Integrity {
                    key: seq.to_string(),
                    source,
                },
            )?;
            let entry: AuditLogEntry = serde_json::from_slice(&plaintext)?;
            out.push((seq, entry));
        }
        Ok(out)
    }

    /// Number of entries with the given action. Compliance reporting and
    /// test support.
    pub fn count_by_action(&self, action: AuditAction) -> Result<usize, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(_, e)| e.action == action)
            .count())
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Build a metadata map from string pairs. Saves callers from the
/// `BTreeMap::insert` chant at every audit site.
pub fn metadata<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
