//! # ZeroIdDb — Persistent Storage Engine
//!
//! The persistence layer for the service, built on sled's embedded
//! key-value store. sled organizes data into named "trees" (analogous to
//! column families in RocksDB); each ZeroID store is one tree:
//!
//! | Tree            | Key                      | Value                        |
//! |-----------------|--------------------------|------------------------------|
//! | `escrow`        | escrow id (UTF-8)        | encrypted `EscrowEntry`      |
//! | `credentials`   | credential id (UTF-8)    | encrypted credential doc     |
//! | `nullifiers`    | nullifier decimal (UTF-8)| encrypted `NullifierEntry`   |
//! | `proof_cache`   | fingerprint hex (UTF-8)  | encrypted `ProofCacheEntry`  |
//! | `verifications` | record id (UTF-8)        | encrypted record             |
//! | `audit`         | sequence (8B BE)         | encrypted `AuditLogEntry`    |
//!
//! All values are AES-GCM envelopes written by [`super::encrypted`]; this
//! module only hands out tree handles and owns open/flush/close.
//!
//! sled is inherently thread-safe — lock-free concurrent reads,
//! serialized writes — so `ZeroIdDb` is shared via `Arc` without external
//! synchronization.

use sled::{Db, Tree};
use std::path::Path;

/// Errors from database open and maintenance operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Persistent storage engine for ZeroID.
#[derive(Debug, Clone)]
pub struct ZeroIdDb {
    /// The underlying sled database handle.
    db: Db,
    escrow: Tree,
    credentials: Tree,
    nullifiers: Tree,
    proof_cache: Tree,
    verifications: Tree,
    audit: Tree,
}

impl ZeroIdDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that lives in memory and is cleaned
    /// up when dropped. Ideal for tests — no filesystem side effects.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let escrow = db.open_tree("escrow")?;
        let credentials = db.open_tree("credentials")?;
        let nullifiers = db.open_tree("nullifiers")?;
        let proof_cache = db.open_tree("proof_cache")?;
        let verifications = db.open_tree("verifications")?;
        let audit = db.open_tree("audit")?;

        Ok(Self {
            db,
            escrow,
            credentials,
            nullifiers,
            proof_cache,
            verifications,
            audit,
        })
    }

    /// The escrow tree: double-encrypted PII blobs.
    pub fn escrow_tree(&self) -> &Tree {
        &self.escrow
    }

    /// The credential document tree.
    pub fn credentials_tree(&self) -> &Tree {
        &self.credentials
    }

    /// The nullifier registry tree.
    pub fn nullifiers_tree(&self) -> &Tree {
        &self.nullifiers
    }

    /// The L2 verification cache tree.
    pub fn proof_cache_tree(&self) -> &Tree {
        &self.proof_cache
    }

    /// The verification record tree.
    pub fn verifications_tree(&self) -> &Tree {
        &self.verifications
    }

    /// The append-only audit tree.
    pub fn audit_tree(&self) -> &Tree {
        &self.audit
    }

    /// Force a flush of all pending writes to disk. sled buffers writes
    /// in memory; this blocks until everything is durable. Called on
    /// shutdown so no acknowledged write is lost to a clean exit.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
