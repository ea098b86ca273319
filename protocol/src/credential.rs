//! # Signed Credentials
//!
//! The artifact issuance produces: a Poseidon commitment over the user's
//! private attributes, signed by the issuer's BabyJubJub key. The holder
//! later proves predicates about the committed attributes without
//! revealing them; the commitment is what ties the proof back to a
//! credential this issuer actually vouched for.
//!
//! Three representations live here:
//!
//! - [`SignedCredential`] — the in-memory form with real curve types;
//! - [`CredentialWire`] — the JSON the client receives once over TLS,
//!   field elements as decimal strings, points as string pairs;
//! - [`CredentialRecord`] — the persisted document: queryable index
//!   fields in the clear, everything cryptographic sealed in a
//!   store-key envelope. The user secret is in none of the persisted
//!   forms — it crosses the wire exactly once and is gone.

use ark_bn254::Fr;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use thiserror::Error;

use crate::config::{
    AES_KEY_LENGTH, CREDENTIAL_TTL_MS, MAX_AGE, MAX_COUNTRY_CODE, MAX_DISCLOSURE_LEVEL,
    MIN_COUNTRY_CODE,
};
use crate::crypto::eddsa::{EddsaPublicKey, EddsaSignature};
use crate::crypto::encryption::{self, EncryptedBlob};
use crate::crypto::field::{
    fr_from_decimal, fr_to_decimal, jub_scalar_from_decimal, jub_scalar_to_decimal,
};
use crate::crypto::{EddsaError, EncryptionError, FieldError};

/// Errors from credential construction and persistence.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("date of birth is in the future")]
    FutureDateOfBirth,

    #[error("age {0} does not fit the circuit's 8-bit bound")]
    AgeOverflow(u32),

    #[error("country code {0} outside ISO 3166-1 numeric range")]
    InvalidCountryCode(u16),

    #[error("disclosure level {0} outside 0..={MAX_DISCLOSURE_LEVEL}")]
    InvalidLevel(u8),

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Eddsa(#[from] EddsaError),

    #[error(transparent)]
    Crypto(#[from] EncryptionError),

    #[error("credential store error: {0}")]
    Store(#[from] sled::Error),

    #[error("credential document corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Age and level derivation
// ---------------------------------------------------------------------------

/// Age in completed Gregorian years on `today`: year difference, minus
/// one if this year's birthday hasn't happened yet.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Age at this instant, validated against the circuit's 8-bit bound.
pub fn current_age(date_of_birth: NaiveDate) -> Result<u8, CredentialError> {
    let age = age_on(date_of_birth, Utc::now().date_naive());
    if age < 0 {
        return Err(CredentialError::FutureDateOfBirth);
    }
    let age = age as u32;
    if age > MAX_AGE {
        return Err(CredentialError::AgeOverflow(age));
    }
    Ok(age as u8)
}

/// Resolve the disclosure level: the caller's choice if given (bounds
/// checked), else the highest tier the verified attributes support.
pub fn derive_level(
    requested: Option<u8>,
    age: u8,
    country_code: u16,
) -> Result<u8, CredentialError> {
    if let Some(level) = requested {
        if level > MAX_DISCLOSURE_LEVEL {
            return Err(CredentialError::InvalidLevel(level));
        }
        return Ok(level);
    }
    let has_country = (MIN_COUNTRY_CODE..=MAX_COUNTRY_CODE).contains(&country_code);
    Ok(match (age > 0, has_country) {
        (true, true) => 3,
        (true, false) => 1,
        _ => 0,
    })
}

// ---------------------------------------------------------------------------
// In-memory credential
// ---------------------------------------------------------------------------

/// A freshly issued credential, before it crosses the wire.
#[derive(Debug, Clone)]
pub struct SignedCredential {
    pub id: String,
    /// The user's secret field element. Leaves the server exactly once,
    /// inside the issuance response. Never persisted.
    pub user_secret: Fr,
    /// `Poseidon(age, countryCode, userSecret)`.
    pub credential_hash: Fr,
    pub signature: EddsaSignature,
    pub issuer_pub_key: EddsaPublicKey,
    pub bound_address: Option<String>,
    /// Progressive-disclosure tier, 0..=4.
    pub level: u8,
    /// Epoch milliseconds.
    pub issued_at: i64,
    pub expires_at: i64,
}

impl SignedCredential {
    /// Default expiry for a credential issued at `issued_at`.
    pub fn default_expiry(issued_at: i64) -> i64 {
        issued_at + CREDENTIAL_TTL_MS
    }

    /// The wire form sent to the client.
    pub fn to_wire(&self) -> CredentialWire {
        CredentialWire {
            id: self.id.clone(),
            user_secret: fr_to_decimal(&self.user_secret),
            credential_hash: fr_to_decimal(&self.credential_hash),
            signature: SignatureWire {
                r8: [
                    fr_to_decimal(&self.signature.r8.x),
                    fr_to_decimal(&self.signature.r8.y),
                ],
                s: jub_scalar_to_decimal(&self.signature.s),
            },
            issuer_pub_key: [
                fr_to_decimal(&self.issuer_pub_key.ax()),
                fr_to_decimal(&self.issuer_pub_key.ay()),
            ],
            bound_address: self.bound_address.clone(),
            level: self.level,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Signature as it travels: `R8` point as a string pair, `S` as a
/// decimal scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureWire {
    pub r8: [String; 2],
    pub s: String,
}

impl SignatureWire {
    /// Decode and validate into curve types.
    pub fn to_signature(&self) -> Result<EddsaSignature, CredentialError> {
        let r8x = fr_from_decimal(&self.r8[0])?;
        let r8y = fr_from_decimal(&self.r8[1])?;
        let s = jub_scalar_from_decimal(&self.s)?;
        Ok(EddsaSignature::from_parts(r8x, r8y, s)?)
    }
}

/// The on-wire credential JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialWire {
    pub id: String,
    pub user_secret: String,
    pub credential_hash: String,
    pub signature: SignatureWire,
    pub issuer_pub_key: [String; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_address: Option<String>,
    pub level: u8,
    pub issued_at: i64,
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Persisted credential document
// ---------------------------------------------------------------------------

/// The cryptographic half of the stored document, sealed under the
/// credential store key. The user secret is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSensitive {
    pub credential_hash: String,
    pub signature: SignatureWire,
    pub issuer_pub_key: [String; 2],
}

/// The stored document: index fields queryable in the clear, sensitive
/// fields inside an [`EncryptedBlob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub credential_id: String,
    pub bound_address: Option<String>,
    pub smart_account_address: Option<String>,
    pub level: u8,
    pub issued_at: i64,
    pub expires_at: i64,
    pub sensitive: EncryptedBlob,
}

/// The credential document store.
///
/// Unlike the fully opaque stores, this one keeps its index fields in
/// plaintext JSON so they can be queried without decryption; only the
/// `sensitive` blob needs the store key.
#[derive(Clone)]
pub struct CredentialStore {
    tree: Tree,
    key: [u8; AES_KEY_LENGTH],
}

impl CredentialStore {
    pub fn new(tree: Tree, key: [u8; AES_KEY_LENGTH]) -> Self {
        Self { tree, key }
    }

    /// Persist a credential document.
    pub fn put(&self, credential: &SignedCredential) -> Result<(), CredentialError> {
        let sensitive = CredentialSensitive {
            credential_hash: fr_to_decimal(&credential.credential_hash),
            signature: SignatureWire {
                r8: [
                    fr_to_decimal(&credential.signature.r8.x),
                    fr_to_decimal(&credential.signature.r8.y),
                ],
                s: jub_scalar_to_decimal(&credential.signature.s),
            },
            issuer_pub_key: [
                fr_to_decimal(&credential.issuer_pub_key.ax()),
                fr_to_decimal(&credential.issuer_pub_key.ay()),
            ],
        };
        let sealed = encryption::encrypt(&self.key, &serde_json::to_vec(&sensitive)?)?;

        let record = CredentialRecord {
            credential_id: credential.id.clone(),
            bound_address: credential.bound_address.clone(),
            smart_account_address: None,
            level: credential.level,
            issued_at: credential.issued_at,
            expires_at: credential.expires_at,
            sensitive: sealed,
        };

        self.tree
            .insert(credential.id.as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Fetch a document by credential id.
    pub fn get(&self, credential_id: &str) -> Result<Option<CredentialRecord>, CredentialError> {
        match self.tree.get(credential_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Decrypt the sensitive half of a stored document.
    pub fn open_sensitive(
        &self,
        record: &CredentialRecord,
    ) -> Result<CredentialSensitive, CredentialError> {
        let plaintext = encryption::decrypt(&self.key, &record.sensitive)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Bind an external address to a credential (index field update).
    pub fn bind_address(
        &self,
        credential_id: &str,
        address: &str,
    ) -> Result<CredentialRecord, CredentialError> {
        let mut record = self
            .get(credential_id)?
            .ok_or_else(|| CredentialError::NotFound(credential_id.to_string()))?;
        record.bound_address = Some(address.to_string());
        self.tree
            .insert(credential_id.as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    /// Scan the index for a bound address. Index fields are plaintext
    /// precisely so this query never touches a key.
    pub fn find_by_bound_address(
        &self,
        address: &str,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        for item in self.tree.iter() {
            let (_, raw) = item?;
            let record: CredentialRecord = serde_json::from_slice(&raw)?;
            if record.bound_address.as_deref() == Some(address) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Number of stored credentials.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Remove a document. Issuance rollback support.
    pub fn remove(&self, credential_id: &str) -> Result<bool, CredentialError> {
        Ok(self.tree.remove(credential_id.as_bytes())?.is_some())
    }
}
