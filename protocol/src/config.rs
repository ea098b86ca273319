//! # Protocol Configuration & Constants
//!
//! Every magic number in ZeroID lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Several of these values are shared with the Circom circuit that produces
//! the proofs we verify. Changing one without re-running the circuit
//! ceremony silently invalidates every proof in the wild, so treat this
//! file as part of the wire contract.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Service Identity
// ---------------------------------------------------------------------------

/// Service name reported by `/health` and baked into log output.
pub const SERVICE_NAME: &str = "zeroid";

/// API version string clients must send in the `X-ZeroID-Version` header.
pub const API_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM for all at-rest encryption. 256-bit keys, 96-bit IVs,
/// 128-bit authentication tags.
pub const SYMMETRIC_ALGORITHM: &str = "aes-256-gcm";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM IV length in bytes. 96 bits is the standard and the only
/// length you should use. 12 bytes. Not 16. Not 8. Twelve.
pub const AES_IV_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// HKDF info prefix for per-store key derivation. The store name is
/// appended, so the escrow store key is derived with `zeroid-store-escrow`.
pub const STORE_KEY_INFO_PREFIX: &str = "zeroid-store-";

/// Number of random bytes drawn for a user secret. 31 bytes keeps the
/// raw integer strictly below the BN254 scalar modulus, so the reduction
/// is a no-op and the secret stays uniform over its range.
pub const USER_SECRET_BYTES: usize = 31;

/// The proof system curve. BN254 because the circuits are Circom and the
/// EVM precompiles exist for it — interop beats security-margin bragging.
pub const ZKP_CURVE: &str = "BN254";

// ---------------------------------------------------------------------------
// Credential Parameters
// ---------------------------------------------------------------------------

/// Default credential lifetime: 365 days, in milliseconds.
pub const CREDENTIAL_TTL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// The circuit constrains the age input to 8 bits. An age that does not
/// fit is an issuance error, not a silent truncation.
pub const MAX_AGE: u32 = 255;

/// Progressive-disclosure tiers run 0 (nothing proven) through 4.
pub const MAX_DISCLOSURE_LEVEL: u8 = 4;

/// ISO 3166-1 numeric country codes are 1..=999.
pub const MIN_COUNTRY_CODE: u16 = 1;
pub const MAX_COUNTRY_CODE: u16 = 999;

// ---------------------------------------------------------------------------
// Sanctions Tree
// ---------------------------------------------------------------------------

/// Depth of the sanctions Merkle tree. 2^10 = 1024 leaf slots, which is
/// an order of magnitude more than the number of comprehensively
/// sanctioned jurisdictions that have ever existed.
pub const SANCTIONS_TREE_DEPTH: usize = 10;

// ---------------------------------------------------------------------------
// Public Signal Layout
// ---------------------------------------------------------------------------
//
// The KYC circuit emits its public signals positionally. These indices are
// a versioned contract with the circuit: reordering the circuit outputs
// without bumping these constants breaks every deployed verifier.

/// Index of the issuer public key X coordinate.
pub const SIGNAL_ISSUER_AX: usize = 0;
/// Index of the issuer public key Y coordinate.
pub const SIGNAL_ISSUER_AY: usize = 1;
/// Index of the required-age predicate input.
pub const SIGNAL_REQUIRED_AGE: usize = 2;
/// Index of the restricted-country predicate input.
pub const SIGNAL_RESTRICTED_COUNTRY: usize = 3;
/// Index of the application identifier.
pub const SIGNAL_APP_ID: usize = 4;
/// Index of the per-(user, app) nullifier.
pub const SIGNAL_NULLIFIER: usize = 5;
/// Index of the credential hash.
pub const SIGNAL_CREDENTIAL_HASH: usize = 6;

/// Number of public signals the KYC circuit emits.
pub const KYC_SIGNAL_COUNT: usize = 7;

/// Requests may carry 1..=50 public signals; anything outside that range
/// is rejected at the boundary before parsing.
pub const MAX_PUBLIC_SIGNALS: usize = 50;

// ---------------------------------------------------------------------------
// Verification Cache
// ---------------------------------------------------------------------------

/// Maximum number of entries in the in-process L1 cache.
pub const L1_CACHE_CAPACITY: usize = 10_000;

/// Per-entry TTL for both cache layers.
pub const CACHE_TTL: Duration = Duration::from_secs(3_600);

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Maximum number of proofs accepted by a single aggregate call.
pub const MAX_AGGREGATE_PROOFS: usize = 100;

// ---------------------------------------------------------------------------
// Escrow Retention
// ---------------------------------------------------------------------------

/// One Julian year (365.25 days) in milliseconds. Retention windows are
/// quoted in Julian years so leap years don't shave hours off a legal
/// obligation.
pub const JULIAN_YEAR_MS: i64 = 31_557_600_000;

/// Retention in Julian years for a jurisdiction. The table currently
/// pins every jurisdiction at five years; it exists so a future
/// divergence is a one-line change rather than an archaeology project.
pub fn retention_years(jurisdiction: &str) -> i64 {
    match jurisdiction {
        "US" | "EU" | "UK" => 5,
        _ => 5,
    }
}

/// Retention window in milliseconds for a jurisdiction.
pub fn retention_ms(jurisdiction: &str) -> i64 {
    retention_years(jurisdiction) * JULIAN_YEAR_MS
}

// ---------------------------------------------------------------------------
// Rate Limiting
// ---------------------------------------------------------------------------

/// Token bucket capacity per API key.
pub const RATE_LIMIT_REQUESTS: u32 = 100;

/// Token bucket refill window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Validation Limits
// ---------------------------------------------------------------------------

/// A verification request names 1..=10 requirements.
pub const MAX_REQUIREMENTS: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_indices_are_contiguous() {
        // The circuit emits signals positionally; a gap here means the
        // parser and the circuit disagree about the layout.
        let indices = [
            SIGNAL_ISSUER_AX,
            SIGNAL_ISSUER_AY,
            SIGNAL_REQUIRED_AGE,
            SIGNAL_RESTRICTED_COUNTRY,
            SIGNAL_APP_ID,
            SIGNAL_NULLIFIER,
            SIGNAL_CREDENTIAL_HASH,
        ];
        for (expected, actual) in indices.iter().enumerate() {
            assert_eq!(expected, *actual);
        }
        assert_eq!(KYC_SIGNAL_COUNT, indices.len());
    }

    #[test]
    fn aes_parameter_sizes() {
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_IV_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
    }

    #[test]
    fn retention_is_five_julian_years_everywhere() {
        for j in ["US", "EU", "UK", "JP", "BR", ""] {
            assert_eq!(retention_years(j), 5);
            assert_eq!(retention_ms(j), 5 * JULIAN_YEAR_MS);
        }
    }

    #[test]
    fn julian_year_is_365_and_a_quarter_days() {
        assert_eq!(
            JULIAN_YEAR_MS,
            (365 * 24 * 60 * 60 * 1000) + (6 * 60 * 60 * 1000)
        );
    }

    #[test]
    fn credential_ttl_is_one_calendar_year() {
        assert_eq!(CREDENTIAL_TTL_MS, 365 * 86_400_000);
    }

    #[test]
    fn cache_limits_sanity() {
        assert!(L1_CACHE_CAPACITY >= 1);
        assert_eq!(CACHE_TTL.as_secs(), 3_600);
        assert!(MAX_AGGREGATE_PROOFS <= 100);
    }
}
