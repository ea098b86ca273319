//! # HTTP API Surface
//!
//! Builds the axum router for the service. All endpoints share
//! application state through axum's `State` extractor; everything under
//! `/api/v1` additionally passes the auth + rate-limit middleware.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                       |
//! |--------|-------------------------------|-----------------------------------|
//! | GET    | `/health`                     | Liveness probe                    |
//! | GET    | `/metrics`                    | Prometheus metrics                |
//! | POST   | `/api/v1/verify`              | Open a verification request       |
//! | GET    | `/api/v1/verify/{id}`         | Verification request status       |
//! | POST   | `/api/v1/credential`          | KYC submission → signed credential|
//! | POST   | `/api/v1/credential/{id}/bind`| Bind an external address          |
//! | POST   | `/api/v1/proof/verify`        | Verify one Groth16 proof          |
//! | POST   | `/api/v1/proof/aggregate`     | Verify a batch (1..=100)          |
//!
//! Bodies are validated by hand against the documented schema so that
//! every rejection is a 400 with per-field paths — axum's default
//! extractor rejections don't know our field names.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use zeroid_protocol::config::{
    MAX_COUNTRY_CODE, MAX_DISCLOSURE_LEVEL, MAX_REQUIREMENTS, MIN_COUNTRY_CODE, SERVICE_NAME,
};
use zeroid_protocol::kyc::{DocumentType, KycSubmission};
use zeroid_protocol::records::Requirement;
use zeroid_protocol::service::ZeroId;
use zeroid_protocol::verifier::ProofSubmission;

use crate::auth::{auth_middleware, ApiKeys, RateLimiter};
use crate::error::{ApiError, FieldIssue};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ZeroId>,
    pub metrics: SharedMetrics,
    pub api_keys: Arc<ApiKeys>,
    pub limiter: Arc<RateLimiter>,
    /// Reported by `/health`.
    pub version: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with routes, CORS, auth, and tracing.
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let cors = match cors_origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any),
    };

    let protected = Router::new()
        .route("/verify", post(create_verification_handler))
        .route("/verify/{id}", get(get_verification_handler))
        .route("/credential", post(create_credential_handler))
        .route("/credential/{id}/bind", post(bind_credential_handler))
        .route("/proof/verify", post(verify_proof_handler))
        .route("/proof/aggregate", post(aggregate_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_route))
        .nest("/api/v1", protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Public Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe for orchestrators. Intentionally does
/// not check subsystem health; a wedged store should not make the
/// scheduler restart-loop the process.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": state.version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /metrics` — Prometheus text exposition.
async fn metrics_route(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.encode())
}

// ---------------------------------------------------------------------------
// Verification Records
// ---------------------------------------------------------------------------

/// `POST /api/v1/verify` — open a verification request.
async fn create_verification_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_string(&body, "userId")?;

    let requirements_value = body
        .get("requirements")
        .cloned()
        .ok_or_else(|| ApiError::invalid("requirements", "field is required"))?;
    let requirements: Vec<Requirement> = serde_json::from_value(requirements_value)
        .map_err(|e| ApiError::invalid("requirements", e.to_string()))?;
    if requirements.is_empty() || requirements.len() > MAX_REQUIREMENTS {
        return Err(ApiError::invalid(
            "requirements",
            format!("length must be 1..={MAX_REQUIREMENTS}"),
        ));
    }

    let record = state.service.create_verification(&user_id, requirements)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": record.id, "status": record.status })),
    ))
}

/// `GET /api/v1/verify/{id}` — verification request status.
async fn get_verification_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .service
        .get_verification(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("verification {id}")))?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// Credential Issuance
// ---------------------------------------------------------------------------

/// `POST /api/v1/credential` — run the issuance pipeline.
async fn create_credential_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let (submission, bound_address, level, verification_id) = parse_credential_request(&body)?;

    let outcome = state
        .service
        .issue_credential(submission, bound_address, level, verification_id.as_deref())
        .await?;

    state.metrics.credentials_issued_total.inc();
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "credential": outcome.credential.to_wire(),
            "escrowId": outcome.escrow_id,
        })),
    ))
}

/// `POST /api/v1/credential/{id}/bind` — bind an external address.
async fn bind_credential_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let address = require_string(&body, "address")?;
    if !is_valid_address(&address) {
        return Err(ApiError::invalid("address", "must match ^0x[a-fA-F0-9]{40}$"));
    }

    state.service.bind_credential(&id, &address)?;
    Ok(Json(serde_json::json!({
        "credentialId": id,
        "boundAddress": address,
    })))
}

// ---------------------------------------------------------------------------
// Proof Verification
// ---------------------------------------------------------------------------

/// `POST /api/v1/proof/verify` — the full cache/verify/nullifier path.
async fn verify_proof_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let submission: ProofSubmission = serde_json::from_value(body)
        .map_err(|e| ApiError::invalid("proof", e.to_string()))?;

    let started = std::time::Instant::now();
    let outcome = state.service.verify_proof(submission).await.map_err(|e| {
        if matches!(e, zeroid_protocol::verifier::VerifyError::Replay { .. }) {
            state.metrics.proof_replays_total.inc();
        }
        ApiError::from(e)
    })?;

    if outcome.cached {
        state.metrics.proof_cache_hits_total.inc();
    } else {
        state
            .metrics
            .verify_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        if outcome.valid {
            state.metrics.proofs_valid_total.inc();
        } else {
            state.metrics.proofs_invalid_total.inc();
        }
    }

    Ok(Json(outcome))
}

/// `POST /api/v1/proof/aggregate` — batch verification.
async fn aggregate_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let proofs_value = body
        .get("proofs")
        .cloned()
        .ok_or_else(|| ApiError::invalid("proofs", "field is required"))?;
    let entries: Vec<ProofSubmission> = serde_json::from_value(proofs_value)
        .map_err(|e| ApiError::invalid("proofs", e.to_string()))?;

    let outcome = state.service.aggregate_proofs(entries).await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Request Validation
// ---------------------------------------------------------------------------

/// Parse and validate the credential request body, accumulating every
/// field complaint instead of stopping at the first.
fn parse_credential_request(
    body: &serde_json::Value,
) -> Result<(KycSubmission, Option<String>, Option<u8>, Option<String>), ApiError> {
    let mut issues = Vec::new();

    let full_name = match body.get("fullName").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            issues.push(FieldIssue::new("fullName", "non-empty string required"));
            String::new()
        }
    };

    let date_of_birth = match body.get("dateOfBirth").and_then(|v| v.as_str()) {
        Some(s) if is_valid_date_shape(s) => s.to_string(),
        _ => {
            issues.push(FieldIssue::new("dateOfBirth", "must match YYYY-MM-DD"));
            String::new()
        }
    };

    let country_code = match body.get("countryCode").and_then(|v| v.as_u64()) {
        Some(c) if (MIN_COUNTRY_CODE as u64..=MAX_COUNTRY_CODE as u64).contains(&c) => c as u16,
        _ => {
            issues.push(FieldIssue::new(
                "countryCode",
                format!("integer {MIN_COUNTRY_CODE}..={MAX_COUNTRY_CODE} required"),
            ));
            0
        }
    };

    let document_type = match body
        .get("documentType")
        .and_then(|v| serde_json::from_value::<DocumentType>(v.clone()).ok())
    {
        Some(d) => d,
        None => {
            issues.push(FieldIssue::new(
                "documentType",
                "one of passport, drivers_license, national_id",
            ));
            DocumentType::Passport
        }
    };

    let document_number = match body.get("documentNumber").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            issues.push(FieldIssue::new("documentNumber", "non-empty string required"));
            String::new()
        }
    };

    let bound_address = match body.get("boundAddress") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if is_valid_address(s) => Some(s.clone()),
        Some(_) => {
            issues.push(FieldIssue::new("boundAddress", "must match ^0x[a-fA-F0-9]{40}$"));
            None
        }
    };

    let level = match body.get("level") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(l) if l <= MAX_DISCLOSURE_LEVEL as u64 => Some(l as u8),
            _ => {
                issues.push(FieldIssue::new(
                    "level",
                    format!("integer 0..={MAX_DISCLOSURE_LEVEL} required"),
                ));
                None
            }
        },
    };

    let verification_id = body
        .get("verificationId")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    Ok((
        KycSubmission {
            full_name,
            date_of_birth,
            country_code,
            document_type,
            document_number,
        },
        bound_address,
        level,
        verification_id,
    ))
}

/// A required top-level string field.
fn require_string(body: &serde_json::Value, field: &str) -> Result<String, ApiError> {
    match body.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(ApiError::invalid(field, "non-empty string required")),
    }
}

/// `^\d{4}-\d{2}-\d{2}$` without pulling in a regex engine for one
/// pattern. Calendar validity is checked downstream.
fn is_valid_date_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && [0, 1, 2, 3, 5, 6, 8, 9]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit())
}

/// `^0x[a-fA-F0-9]{40}$`.
fn is_valid_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}
