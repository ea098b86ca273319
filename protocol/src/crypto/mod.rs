//! # Cryptographic Primitives for ZeroID
//!
//! This module is the foundation of everything security-related in the
//! service. Two worlds meet here and must agree bit-for-bit:
//!
//! - **Circuit-side arithmetic** — Poseidon over the BN254 scalar field
//!   and EdDSA on BabyJubJub. The same hash runs inside the Circom
//!   circuit and out here during issuance; a single mismatched round
//!   constant silently invalidates every proof ever generated.
//! - **Boring-but-critical symmetric crypto** — AES-256-GCM envelopes for
//!   everything at rest, HKDF-SHA-256 for per-store key derivation.
//!
//! ```text
//! poseidon.rs    — circomlib-parameter Poseidon over BN254 Fr
//! eddsa.rs       — EdDSA on BabyJubJub with a Poseidon challenge
//! encryption.rs  — AES-256-GCM with split {iv, ciphertext, tag} output
//! kdf.rs         — HKDF-SHA-256 store key derivation
//! hash.rs        — SHA-256 helpers (fingerprints, integrity hashes)
//! field.rs       — decimal-string wire codecs for field elements
//! keys.rs        — issuer / regulator / store-master key loading
//! ```

pub mod eddsa;
pub mod encryption;
pub mod field;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod poseidon;

pub use eddsa::{EddsaError, EddsaKeypair, EddsaPublicKey, EddsaSignature};
pub use encryption::{decrypt, encrypt, EncryptedBlob, EncryptionError};
pub use field::{
    fr_from_decimal, fr_from_random_bytes, fr_to_decimal, jub_scalar_from_decimal,
    jub_scalar_to_decimal, FieldError,
};
pub use hash::{sha256, sha256_array, sha256_hex};
pub use kdf::derive_store_key;
pub use keys::{KeyError, RegulatorKeys};
pub use poseidon::{poseidon2, poseidon3, poseidon5, PoseidonError};
