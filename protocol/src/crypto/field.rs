//! # Field Element Wire Helpers
//!
//! Every field element that crosses the API boundary travels as a decimal
//! string — that is the snarkjs convention and the credential wire format.
//! These helpers centralize the conversions so nobody hand-rolls a parse
//! with a different reduction behavior.

use ark_bn254::Fr;
use std::str::FromStr;
use thiserror::Error;

/// Errors from decoding wire-format field elements.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("not a decimal field element: {0:?}")]
    InvalidDecimal(String),
}

/// Parse a decimal string into a BN254 scalar.
///
/// Rejects anything that is not a canonical non-negative decimal integer
/// below the field modulus — no hex, no sign, no silent reduction.
pub fn fr_from_decimal(s: &str) -> Result<Fr, FieldError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::InvalidDecimal(s.to_string()));
    }
    Fr::from_str(s).map_err(|_| FieldError::InvalidDecimal(s.to_string()))
}

/// Render a BN254 scalar as its canonical decimal string.
pub fn fr_to_decimal(x: &Fr) -> String {
    x.to_string()
}

/// Parse a decimal string into a BabyJubJub scalar (the signature `S`
/// component travels in the same decimal convention).
pub fn jub_scalar_from_decimal(s: &str) -> Result<ark_ed_on_bn254::Fr, FieldError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::InvalidDecimal(s.to_string()));
    }
    ark_ed_on_bn254::Fr::from_str(s).map_err(|_| FieldError::InvalidDecimal(s.to_string()))
}

/// Render a BabyJubJub scalar as its canonical decimal string.
pub fn jub_scalar_to_decimal(x: &ark_ed_on_bn254::Fr) -> String {
    x.to_string()
}

/// Interpret random bytes as a field element.
///
/// Callers drawing user secrets pass 31 bytes, which is strictly below
/// the modulus, so the value is uniform and the modular reduction is a
/// no-op.
pub fn fr_from_random_bytes(bytes: &[u8]) -> Fr {
    use ark_ff::PrimeField;
    Fr::from_le_bytes_mod_order(bytes)
}
