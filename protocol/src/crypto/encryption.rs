//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for ZeroID. Every byte that touches disk —
//! escrow blobs, credential documents, cached verification results, audit
//! entries — passes through this module first.
//!
//! ## Nonce management
//!
//! GCM is notoriously unforgiving about IV reuse: encrypt two messages
//! with the same key and IV and an attacker can recover the XOR of the
//! plaintexts AND forge authentication tags. Our strategy is random
//! 96-bit IVs from the OS CSPRNG, fresh per call. The birthday bound for
//! 96-bit IVs is ~2^48 messages per key; store keys are per-tree and the
//! regulator key encrypts one blob per credential, so we are nowhere
//! near it.
//!
//! ## Output format
//!
//! Unlike a packed `nonce || ciphertext` wire format, ZeroID persists the
//! three components separately as [`EncryptedBlob`] `{iv, ciphertext,
//! tag}` — that split layout is the on-disk contract for every store, and
//! it keeps the regulator-facing escrow format self-describing.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AES_IV_LENGTH, AES_KEY_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// We intentionally keep these vague. The difference between "wrong key"
/// and "corrupted ciphertext" is none of an attacker's business.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// The three components of an AES-256-GCM encryption, kept separate.
///
/// Serializes with hex-encoded fields — this is exactly the shape the
/// persistent stores write, so a blob can round-trip through JSON without
/// a second framing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// 12-byte random IV, hex-encoded.
    pub iv: String,
    /// Ciphertext without the tag, hex-encoded.
    pub ciphertext: String,
    /// 16-byte GCM authentication tag, hex-encoded.
    pub tag: String,
}

impl EncryptedBlob {
    /// Decode the hex fields into raw bytes, validating component lengths.
    fn decode(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), EncryptionError> {
        let iv = hex::decode(&self.iv)
            .map_err(|e| EncryptionError::MalformedPayload(format!("iv: {e}")))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|e| EncryptionError::MalformedPayload(format!("ciphertext: {e}")))?;
        let tag = hex::decode(&self.tag)
            .map_err(|e| EncryptionError::MalformedPayload(format!("tag: {e}")))?;

        if iv.len() != AES_IV_LENGTH {
            return Err(EncryptionError::MalformedPayload(format!(
                "iv must be {AES_IV_LENGTH} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != AES_TAG_LENGTH {
            return Err(EncryptionError::MalformedPayload(format!(
                "tag must be {AES_TAG_LENGTH} bytes, got {}",
                tag.len()
            )));
        }
        Ok((iv, ciphertext, tag))
    }
}

/// Encrypt plaintext with AES-256-GCM using a fresh random IV.
///
/// The 16-byte authentication tag the cipher appends is split off into
/// its own field, so `ciphertext.len() == plaintext.len()`.
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<EncryptedBlob, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut iv = [0u8; AES_IV_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm appends the 16-byte tag to the ciphertext; peel it off so
    // the persisted layout carries the components separately.
    let mut sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;
    let tag = sealed.split_off(sealed.len() - AES_TAG_LENGTH);

    Ok(EncryptedBlob {
        iv: hex::encode(iv),
        ciphertext: hex::encode(sealed),
        tag: hex::encode(tag),
    })
}

/// Decrypt a blob previously produced by [`encrypt`].
///
/// # Errors
///
/// - [`EncryptionError::MalformedPayload`] if any component is not valid
///   hex or has the wrong length — the payload never reached the cipher.
/// - [`EncryptionError::DecryptFailed`] if the key is wrong or any bit of
///   `iv`, `ciphertext`, or `tag` has been modified. We don't distinguish
///   between those cases on purpose.
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], blob: &EncryptedBlob) -> Result<Vec<u8>, EncryptionError> {
    let (iv, mut ciphertext, tag) = blob.decode()?;

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(&iv);

    ciphertext.extend_from_slice(&tag);
    cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Encrypt with a key provided as a byte slice (length-checked at runtime).
///
/// Convenience wrapper for when the key comes from an untrusted source
/// (e.g., decoded from an environment variable) and might be short.
pub fn encrypt_checked(key: &[u8], plaintext: &[u8]) -> Result<EncryptedBlob, EncryptionError> {
    let key: &[u8; AES_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    encrypt(key, plaintext)
}

/// Decrypt with a key provided as a byte slice (length-checked at runtime).
pub fn decrypt_checked(key: &[u8], blob: &EncryptedBlob) -> Result<Vec<u8>, EncryptionError> {
    let key: &[u8; AES_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    decrypt(key, blob)
}
