//! # API Error Taxonomy
//!
//! One enum, one mapping. Library errors are converted into [`ApiError`]
//! at the handler boundary and never thrown past it; the conversion
//! decides the status code, the stable machine-readable `error` kind,
//! and how much detail the client deserves. Internal failures log their
//! full context and answer with a generic message — stack traces are
//! for operators, not callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use zeroid_protocol::credential::CredentialError;
use zeroid_protocol::issuer::IssuerError;
use zeroid_protocol::kyc::KycError;
use zeroid_protocol::records::RecordError;
use zeroid_protocol::verifier::VerifyError;

/// A single validation complaint: which field, what's wrong.
#[derive(Debug, Clone, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Everything a handler can answer with besides success.
#[derive(Debug)]
pub enum ApiError {
    /// 400 — input schema violation, with per-field paths.
    Validation(Vec<FieldIssue>),
    /// 401 — missing or unknown bearer token.
    Unauthorized(&'static str),
    /// 403 — authenticated but refused (sanctioned country).
    Forbidden(String),
    /// 404 — unknown resource for a public lookup.
    NotFound(String),
    /// 409 — nullifier replay.
    Replay { nullifier: String },
    /// 422 — the KYC provider said no.
    KycFailed { confidence: f64 },
    /// 429 — token bucket empty.
    RateLimited,
    /// 503 — vkey missing, provider or store unavailable.
    Unavailable(String),
    /// 500 — anything else; context goes to the log, not the client.
    Internal(String),
}

impl ApiError {
    /// Shorthand for a single-field validation error.
    pub fn invalid(path: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldIssue::new(path, message)])
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Replay { .. } => StatusCode::CONFLICT,
            ApiError::KycFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation(issues) => serde_json::json!({
                "error": "validation",
                "message": "request validation failed",
                "details": issues,
            }),
            ApiError::Unauthorized(message) => serde_json::json!({
                "error": "unauthorized",
                "message": message,
            }),
            ApiError::Forbidden(message) => serde_json::json!({
                "error": "forbidden",
                "message": message,
            }),
            ApiError::NotFound(what) => serde_json::json!({
                "error": "not_found",
                "message": format!("{what} not found"),
            }),
            ApiError::Replay { nullifier } => serde_json::json!({
                "error": "replay",
                "message": "nullifier already consumed",
                "valid": false,
                "nullifier": nullifier,
            }),
            ApiError::KycFailed { confidence } => serde_json::json!({
                "error": "kyc_failed",
                "message": "identity verification failed",
                "confidence": confidence,
            }),
            ApiError::RateLimited => serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded, retry later",
            }),
            ApiError::Unavailable(message) => serde_json::json!({
                "error": "unavailable",
                "message": message,
            }),
            ApiError::Internal(_) => serde_json::json!({
                "error": "internal",
                "message": "internal server error",
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(context) = &self {
            tracing::error!(%context, "internal error");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<IssuerError> for ApiError {
    fn from(err: IssuerError) -> Self {
        match err {
            IssuerError::Sanctioned(_) => ApiError::Forbidden("Forbidden".into()),
            IssuerError::InvalidCountryCode(code) => {
                ApiError::invalid("countryCode", format!("{code} outside 1..=999"))
            }
            IssuerError::KycRejected { confidence } => ApiError::KycFailed { confidence },
            IssuerError::Kyc(KycError::InvalidDateOfBirth(_)) => {
                ApiError::invalid("dateOfBirth", "not a valid calendar date")
            }
            IssuerError::Kyc(KycError::ProviderUnavailable(_)) => {
                ApiError::Unavailable("kyc provider unavailable".into())
            }
            IssuerError::Credential(CredentialError::InvalidLevel(level)) => {
                ApiError::invalid("level", format!("{level} outside 0..=4"))
            }
            IssuerError::Credential(CredentialError::FutureDateOfBirth) => {
                ApiError::invalid("dateOfBirth", "date of birth is in the future")
            }
            IssuerError::Credential(CredentialError::AgeOverflow(age)) => {
                ApiError::invalid("dateOfBirth", format!("age {age} exceeds the supported range"))
            }
            IssuerError::Credential(CredentialError::NotFound(id)) => {
                ApiError::NotFound(format!("credential {id}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Invalid(e) => ApiError::invalid("proof", e.to_string()),
            VerifyError::Replay { nullifier, .. } => ApiError::Replay { nullifier },
            VerifyError::VerifierUnavailable => {
                ApiError::Unavailable("no verification key loaded".into())
            }
            VerifyError::BadAggregateSize(n) => {
                ApiError::invalid("proofs", format!("{n} entries outside 1..=100"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => ApiError::NotFound(format!("verification {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
