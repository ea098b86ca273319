//! # Hashing Utilities
//!
//! SHA-256 helpers used throughout ZeroID: proof fingerprints, escrow
//! integrity hashes, and API key digests. Everything arithmetic-friendly
//! (commitments, nullifiers, Merkle nodes) goes through Poseidon instead —
//! see [`crate::crypto::poseidon`].

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns a 32-byte digest as a `Vec<u8>`. Half the callers immediately
/// pass it to functions that want `&[u8]`; the heap allocation is noise
/// compared to the cost of the hash itself.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute the SHA-256 hash and return a fixed-size array.
///
/// Same as [`sha256`] but returns `[u8; 32]` for callers that want a
/// fixed-size type without the heap allocation.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute SHA-256 and return the lowercase hex digest.
///
/// This is the canonical form for proof fingerprints and escrow
/// integrity hashes — both are stored and compared as hex strings.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_array(data))
}
