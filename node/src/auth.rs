//! # Authentication & Rate Limiting
//!
//! Every protected route passes through one middleware that enforces,
//! in order:
//!
//! 1. `X-ZeroID-Version: 1` — wire-contract pinning, so an old client
//!    fails loudly instead of misparsing a response;
//! 2. `Authorization: Bearer <api_key>` against the configured
//!    allow-list — keys are stored and compared as SHA-256 digests, so
//!    the plaintext list never sits in a long-lived structure;
//! 3. a per-key token bucket (100 requests / 60 s) — over-budget
//!    requests get 429 and are counted, not logged per-request.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use zeroid_protocol::config::{API_VERSION, RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW};
use zeroid_protocol::crypto::sha256_hex;

use crate::api::AppState;
use crate::error::ApiError;

/// Request header carrying the API contract version.
pub const VERSION_HEADER: &str = "x-zeroid-version";

/// The configured API key allow-list, stored hashed.
pub struct ApiKeys {
    hashes: HashSet<String>,
}

impl ApiKeys {
    /// Hash and store the configured keys. An empty list means every
    /// protected request will be refused — the caller warns at boot.
    pub fn new(keys: &[String]) -> Self {
        Self {
            hashes: keys.iter().map(|k| sha256_hex(k.as_bytes())).collect(),
        }
    }

    /// Whether any keys are configured at all.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Validate a presented key. Returns a short non-reversible label
    /// for rate limiting and logs.
    pub fn validate(&self, presented: &str) -> Option<String> {
        let digest = sha256_hex(presented.as_bytes());
        self.hashes.contains(&digest).then(|| digest[..12].to_string())
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key token bucket limiter.
///
/// One mutex over the bucket map; the critical section is a handful of
/// float operations, far below contention concern at this request rate.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    capacity: f64,
    window: Duration,
}

impl RateLimiter {
    /// Production limits from the protocol constants.
    pub fn new() -> Self {
        Self::with_limits(RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW)
    }

    /// Explicit limits for tests.
    pub fn with_limits(requests: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: requests as f64,
            window,
        }
    }

    /// Take one token for `key`. `false` means the bucket is empty.
    pub fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        // Continuous refill: capacity tokens per window, capped.
        let elapsed = now.duration_since(bucket.last_refill);
        let refill = elapsed.as_secs_f64() / self.window.as_secs_f64() * self.capacity;
        bucket.tokens = (bucket.tokens + refill).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// The middleware guarding `/api/v1/*`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Version pin first: a wrong version is a malformed request, not an
    // authentication failure.
    let version = request
        .headers()
        .get(VERSION_HEADER)
        .and_then(|v| v.to_str().ok());
    if version != Some(API_VERSION) {
        return ApiError::invalid(
            "X-ZeroID-Version",
            format!("header must be present and equal to {API_VERSION:?}"),
        )
        .into_response();
    }

    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(presented) = bearer else {
        return ApiError::Unauthorized("missing bearer token").into_response();
    };
    let Some(key_label) = state.api_keys.validate(presented) else {
        return ApiError::Unauthorized("unknown api key").into_response();
    };

    if !state.limiter.allow(&key_label) {
        state.metrics.rate_limited_total.inc();
        return ApiError::RateLimited.into_response();
    }

    state.metrics.requests_total.inc();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_key_validates_with_stable_label() {
        let keys = ApiKeys::new(&["alpha".into(), "beta".into()]);
        let label_a = keys.validate("alpha").unwrap();
        let label_b = keys.validate("beta").unwrap();
        assert_ne!(label_a, label_b);
        assert_eq!(keys.validate("alpha").unwrap(), label_a);
        assert_eq!(label_a.len(), 12);
    }

    #[test]
    fn unknown_key_rejected() {
        let keys = ApiKeys::new(&["alpha".into()]);
        assert!(keys.validate("gamma").is_none());
        assert!(keys.validate("").is_none());
    }

    #[test]
    fn empty_allowlist_rejects_everything() {
        let keys = ApiKeys::new(&[]);
        assert!(keys.is_empty());
        assert!(keys.validate("anything").is_none());
    }

    #[test]
    fn bucket_exhausts_at_capacity() {
        let limiter = RateLimiter::with_limits(5, Duration::from_secs(3600));
        for _ in 0..5 {
            assert!(limiter.allow("key-1"));
        }
        assert!(!limiter.allow("key-1"));
        // A different key has its own bucket.
        assert!(limiter.allow("key-2"));
    }

    #[test]
    fn bucket_refills_over_time() {
        let limiter = RateLimiter::with_limits(2, Duration::from_millis(100));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn refill_caps_at_capacity() {
        let limiter = RateLimiter::with_limits(3, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(50));
        // However long we waited, only `capacity` tokens are available.
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }
}
