// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZeroID Protocol — Core Library
//!
//! Privacy-preserving identity verification: a user proves facts about a
//! KYC credential — old enough, not from a restricted country, unique per
//! application — without revealing the credential itself. The issuer signs
//! a Poseidon commitment over private attributes; the client proves
//! predicates about it with Groth16; the server verifies, enforces
//! nullifier uniqueness, and keeps an encrypted escrow of the raw PII
//! that only a regulator key can open.
//!
//! ZeroID takes a pragmatic stance: BN254 for proofs (because the
//! circuits are Circom and Groth16 is still the most battle-tested
//! SNARK), EdDSA on BabyJubJub (because it verifies cheaply inside a
//! circuit), and AES-256-GCM for everything at rest (because NIST got
//! that one right).
//!
//! ## Architecture
//!
//! The library mirrors the actual concerns of the service:
//!
//! - **crypto** — Poseidon, BabyJubJub EdDSA, AES-GCM, HKDF, key loading.
//! - **sanctions** — Poseidon Merkle tree over sanctioned country codes.
//! - **store** — encrypted sled-backed stores and the append-only audit log.
//! - **kyc** — submission types and the provider abstraction.
//! - **credential** — the signed credential and its wire form.
//! - **issuer** — the issuance pipeline: screen, verify, hash, sign, persist.
//! - **escrow** — double-encrypted PII with retention and crypto-shredding.
//! - **records** — the verification request state machine.
//! - **verifier** — Groth16 verification, two-layer cache, nullifiers,
//!   batched aggregation.
//! - **service** — the root handle that wires all of the above together.
//! - **config** — protocol constants and the circuit wire contract.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but verification is still sub-5ms).
//! 2. No unsafe code in crypto paths — we sleep at night.
//! 3. Plaintext PII lives exactly as long as the request that carried it.
//! 4. If it touches a key or a proof, it has tests. Plural.

pub mod config;
pub mod credential;
pub mod crypto;
pub mod escrow;
pub mod issuer;
pub mod kyc;
pub mod records;
pub mod sanctions;
pub mod service;
pub mod store;
pub mod verifier;
