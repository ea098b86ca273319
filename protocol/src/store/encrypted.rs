//! # EncryptedKv — Store-Key Envelope over a sled Tree
//!
//! Every value is serialized to JSON, encrypted under the store's
//! HKDF-derived key, and persisted as the envelope
//! `{enc, iv, tag, alg: "aes-256-gcm"}` (all hex). That envelope is the
//! on-disk contract: a regulator with filesystem access and the right
//! store key can decrypt an entry with standard tooling, and nothing
//! else can tell one entry from random bytes.
//!
//! Presence checks go straight to sled's `contains_key` — existence is a
//! fact about the keyspace, not something to infer from whether a
//! decryption happens to fail.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::Tree;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, SYMMETRIC_ALGORITHM};
use crate::crypto::encryption::{self, EncryptedBlob, EncryptionError};

/// Errors from encrypted store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Db(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope exists but does not authenticate under the store
    /// key. This is tampering or key confusion, never a soft miss.
    #[error("store integrity failure for key {key}: {source}")]
    Integrity {
        key: String,
        source: EncryptionError,
    },

    #[error("malformed envelope for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// The persisted envelope shape. `enc` decrypts under the store key to
/// the JSON of the stored value.
#[derive(Serialize, Deserialize)]
struct Envelope {
    enc: String,
    iv: String,
    tag: String,
    alg: String,
}

/// A store-key-scoped encrypted view over one sled tree.
#[derive(Clone)]
pub struct EncryptedKv {
    tree: Tree,
    key: [u8; AES_KEY_LENGTH],
    name: &'static str,
}

impl EncryptedKv {
    /// Wrap a tree with its derived store key. The `name` only labels
    /// errors and log lines.
    pub fn new(tree: Tree, key: [u8; AES_KEY_LENGTH], name: &'static str) -> Self {
        Self { tree, key, name }
    }

    /// The store label.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Serialize, encrypt, and write a value.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = self.seal(key, value)?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Write a value only if the key is absent. Atomic first-writer-wins
    /// via sled's compare-and-swap; returns `false` when someone got
    /// there first.
    pub fn put_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StoreError> {
        let bytes = self.seal(key, value)?;
        let outcome = self
            .tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
        Ok(outcome.is_ok())
    }

    /// Read and decrypt a value. `Ok(None)` means the key is absent;
    /// an envelope that fails authentication is [`StoreError::Integrity`].
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.tree.get(key.as_bytes())? else {
            return Ok(None);
        };
        self.open(key, &raw).map(Some)
    }

    /// Direct presence query, no decryption involved.
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.tree.contains_key(key.as_bytes())?)
    }

    /// Remove a key. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.tree.remove(key.as_bytes())?.is_some())
    }

    /// All keys in the store, in sled's lexicographic order. Used by
    /// maintenance scans (retention purges) that then `get` per key.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (k, _) = item?;
            out.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(out)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn seal<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
        let plaintext = serde_json::to_vec(value)?;
        let blob =
            encryption::encrypt(&self.key, &plaintext).map_err(|source| StoreError::Integrity {
                key: key.to_string(),
                source,
            })?;
        let envelope = Envelope {
            enc: blob.ciphertext,
            iv: blob.iv,
            tag: blob.tag,
            alg: SYMMETRIC_ALGORITHM.to_string(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn open<T: DeserializeOwned>(&self, key: &str, raw: &[u8]) -> Result<T, StoreError> {
        let envelope: Envelope =
            serde_json::from_slice(raw).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if envelope.alg != SYMMETRIC_ALGORITHM {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("unexpected algorithm {:?}", envelope.alg),
            });
        }

        let blob = EncryptedBlob {
            iv: envelope.iv,
            ciphertext: envelope.enc,
            tag: envelope.tag,
        };
        let plaintext =
            encryption::decrypt(&self.key, &blob).map_err(|source| StoreError::Integrity {
                key: key.to_string(),
                source,
            })?;

        serde_json::from_slice(&plaintext).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}
