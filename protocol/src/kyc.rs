//! # KYC Submissions and Provider Abstraction
//!
//! The shapes that cross the issuance boundary: what the user submits,
//! what the provider returns, and the trait a real provider integration
//! implements. The [`MockKycProvider`] ships with the service so the
//! whole pipeline runs end-to-end in development and tests without a
//! vendor account.
//!
//! [`KycSubmission`] is raw PII. It zeroizes its strings on drop, and it
//! deliberately does not implement `Debug` with field contents — the
//! closest it gets to a log line is its document type.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Accepted identity document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    DriversLicense,
    NationalId,
}

/// What the user submits to `POST /credential`. Held in memory exactly
/// as long as the issuance request that carried it.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KycSubmission {
    pub full_name: String,
    /// ISO-8601 date, `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// ISO 3166-1 numeric, 1..=999.
    #[zeroize(skip)]
    pub country_code: u16,
    #[zeroize(skip)]
    pub document_type: DocumentType,
    pub document_number: String,
}

impl KycSubmission {
    /// Parse the date of birth. The HTTP layer has already validated the
    /// shape; this re-checks it is a real calendar date.
    pub fn parsed_date_of_birth(&self) -> Result<NaiveDate, KycError> {
        NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d")
            .map_err(|_| KycError::InvalidDateOfBirth(self.date_of_birth.clone()))
    }
}

impl std::fmt::Debug for KycSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // PII never reaches Debug output, which means it never reaches
        // logs, panics, or assertion messages.
        f.debug_struct("KycSubmission")
            .field("document_type", &self.document_type)
            .field("country_code", &self.country_code)
            .finish_non_exhaustive()
    }
}

/// Provider verdict: the submission plus outcome fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycResult {
    pub passed: bool,
    /// Provider confidence in \[0, 1\].
    pub confidence: f64,
    /// Opaque provider-side reference for this verification.
    pub provider_ref: String,
    /// Epoch milliseconds.
    pub verified_at: i64,
}

/// Errors from KYC processing.
#[derive(Debug, Error)]
pub enum KycError {
    #[error("invalid date of birth: {0:?}")]
    InvalidDateOfBirth(String),

    /// The provider itself was unreachable or returned garbage. Maps to
    /// 503 at the boundary — the user did nothing wrong.
    #[error("kyc provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// A KYC provider integration.
///
/// Implementations call out to a vendor and map its response onto
/// [`KycResult`]. They must not retain the submission after returning.
#[async_trait]
pub trait KycProvider: Send + Sync {
    async fn verify(&self, submission: &KycSubmission) -> Result<KycResult, KycError>;
}

/// Deterministic in-process provider for development and tests.
///
/// A full name containing `REJECT` fails with low confidence; everything
/// else passes. The provider reference is stable per call pattern so
/// tests can assert on it.
pub struct MockKycProvider;

#[async_trait]
impl KycProvider for MockKycProvider {
    async fn verify(&self, submission: &KycSubmission) -> Result<KycResult, KycError> {
        // Re-validate the date so a malformed submission fails here
        // rather than producing a nonsense age downstream.
        submission.parsed_date_of_birth()?;

        let rejected = submission.full_name.to_uppercase().contains("REJECT");
        Ok(KycResult {
            passed: !rejected,
            confidence: if rejected { 0.15 } else { 0.98 },
            provider_ref: format!("mock-{}", uuid::Uuid::new_v4()),
            verified_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}
