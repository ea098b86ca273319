//! # Persistent Stores
//!
//! Everything ZeroID writes to disk goes through this module, and
//! everything it writes is encrypted first. The layering is:
//!
//! ```text
//! db.rs         — ZeroIdDb: the sled database and its named trees
//! encrypted.rs  — EncryptedKv: store-key AES-GCM envelope over one tree
//! audit.rs      — AuditLog: append-only, sequence-ordered event stream
//! ```
//!
//! Each tree gets its own HKDF-derived key (see [`crate::crypto::kdf`]),
//! so the blast radius of a leaked key is exactly one store. Ciphertext
//! under one store key is indistinguishable from random to a holder of
//! any other store key — that's the AES-GCM contract, and the reason the
//! trees don't share keys.

pub mod audit;
pub mod db;
pub mod encrypted;

pub use audit::{metadata, AuditAction, AuditLog, AuditLogEntry};
pub use db::{DbError, ZeroIdDb};
pub use encrypted::{EncryptedKv, StoreError};
