//! # EdDSA on BabyJubJub with a Poseidon Challenge
//!
//! The issuer's signature scheme. BabyJubJub is a twisted Edwards curve
//! whose base field *is* the BN254 scalar field, which means a signature
//! over a Poseidon digest can be re-verified inside a Circom circuit with
//! a few hundred constraints instead of a SHA-2 bit-blasting disaster.
//!
//! The message is a single field element (in practice a Poseidon digest).
//! The scheme is Schnorr-shaped EdDSA on the prime-order subgroup:
//!
//! ```text
//! keygen:  h = SHA-512(seed); s = clamp(h[..32]); A = s·G
//! sign:    r = SHA-512(h[32..] ‖ msg) mod ℓ; R8 = r·G
//!          hm = Poseidon(R8.x, R8.y, A.x, A.y, msg)
//!          S  = r + hm·s  (mod ℓ)
//! verify:  S·G == R8 + hm·A
//! ```
//!
//! Nonces are deterministic (derived from the key and the message), so
//! there is no k-value footgun and no RNG in the signing path. Points
//! parsed off the wire are checked on-curve and in-subgroup before any
//! arithmetic touches them.

use ark_bn254::Fr as Fq; // BabyJubJub base field == BN254 scalar field
use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fr as ScalarField};
use ark_ff::{BigInteger, PrimeField};
use rand::RngCore;
use sha2::{Digest, Sha512};
use thiserror::Error;

use super::poseidon::{poseidon5, PoseidonError};

/// Errors that can occur during EdDSA operations.
///
/// Intentionally vague about *why* something failed — leaking details
/// about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum EddsaError {
    #[error("invalid private key bytes")]
    InvalidPrivateKey,

    #[error("invalid public key: not a BabyJubJub subgroup point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error(transparent)]
    Poseidon(#[from] PoseidonError),
}

/// The public half of an issuer identity: a BabyJubJub point `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EddsaPublicKey(pub EdwardsAffine);

impl EddsaPublicKey {
    /// X coordinate, as a BN254 field element.
    pub fn ax(&self) -> Fq {
        self.0.x
    }

    /// Y coordinate, as a BN254 field element.
    pub fn ay(&self) -> Fq {
        self.0.y
    }

    /// Reconstruct from affine coordinates, validating curve and
    /// subgroup membership. Anything off-curve is an error, not a panic.
    pub fn from_coords(ax: Fq, ay: Fq) -> Result<Self, EddsaError> {
        let point = EdwardsAffine::new_unchecked(ax, ay);
        if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
            return Err(EddsaError::InvalidPublicKey);
        }
        Ok(Self(point))
    }
}

/// A signature `(R8, S)`: a curve point and a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EddsaSignature {
    /// The nonce commitment `R8 = r·G`.
    pub r8: EdwardsAffine,
    /// The response scalar `S = r + hm·s`.
    pub s: ScalarField,
}

impl EddsaSignature {
    /// Reconstruct from wire components, validating `R8` as a subgroup
    /// point and `S` as a canonical scalar.
    pub fn from_parts(r8x: Fq, r8y: Fq, s: ScalarField) -> Result<Self, EddsaError> {
        let r8 = EdwardsAffine::new_unchecked(r8x, r8y);
        if !r8.is_on_curve() || !r8.is_in_correct_subgroup_assuming_on_curve() {
            return Err(EddsaError::InvalidSignature);
        }
        Ok(Self { r8, s })
    }
}

/// An issuer keypair: the 32-byte seed plus the expanded signing state.
///
/// Does NOT implement `Serialize`. Serializing private keys should be a
/// deliberate, conscious act — use [`EddsaKeypair::seed_bytes`] and
/// [`EddsaKeypair::from_seed`] explicitly.
pub struct EddsaKeypair {
    /// The original 32-byte seed (persisted form).
    seed: [u8; 32],
    /// The clamped secret scalar `s`.
    scalar: ScalarField,
    /// The nonce-derivation prefix (second half of the SHA-512 expansion).
    prefix: [u8; 32],
    /// The public key `A = s·G`.
    public: EddsaPublicKey,
}

impl EddsaKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Deterministically expand a 32-byte seed into a keypair.
    ///
    /// The SHA-512 expansion and bit clamping follow the RFC-8032 shape:
    /// the low half becomes the secret scalar, the high half seeds the
    /// deterministic per-message nonce.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let h: [u8; 64] = Sha512::digest(seed).into();

        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&h[..32]);
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 127;
        scalar_bytes[31] |= 64;

        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&h[32..]);

        let scalar = ScalarField::from_le_bytes_mod_order(&scalar_bytes);
        let public_point = (EdwardsAffine::generator() * scalar).into_affine();

        Self {
            seed: *seed,
            scalar,
            prefix,
            public: EddsaPublicKey(public_point),
        }
    }

    /// Reconstruct from a hex-encoded seed.
    pub fn from_hex(hex_str: &str) -> Result<Self, EddsaError> {
        let bytes = hex::decode(hex_str).map_err(|_| EddsaError::InvalidPrivateKey)?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EddsaError::InvalidPrivateKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The raw seed bytes, for persistence. Handle with care; never log.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.seed
    }

    /// The public key `A`.
    pub fn public_key(&self) -> EddsaPublicKey {
        self.public
    }

    /// Sign a single field element message (typically a Poseidon digest).
    pub fn sign_poseidon(&self, msg: Fq) -> Result<EddsaSignature, EddsaError> {
        let msg_bytes = msg.into_bigint().to_bytes_le();

        // Deterministic nonce: r = H(prefix ‖ msg) reduced into the
        // scalar field. Same key + same message => same signature.
        let mut hasher = Sha512::new();
        hasher.update(self.prefix);
        hasher.update(&msg_bytes);
        let r = ScalarField::from_le_bytes_mod_order(&hasher.finalize());

        let r8 = (EdwardsAffine::generator() * r).into_affine();

        let hm = poseidon5(r8.x, r8.y, self.public.ax(), self.public.ay(), msg)?;
        let hm_scalar = ScalarField::from_le_bytes_mod_order(&hm.into_bigint().to_bytes_le());

        let s = r + hm_scalar * self.scalar;

        Ok(EddsaSignature { r8, s })
    }
}

impl Clone for EddsaKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.seed)
    }
}

impl std::fmt::Debug for EddsaKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the seed. Not in Debug, not anywhere.
        f.debug_struct("EddsaKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Verify a signature over a single field element message.
///
/// Returns `Ok(true)` for a valid signature, `Ok(false)` for a
/// well-formed but wrong one, and `Err` only if the challenge hash
/// itself fails (which indicates a parameter bug, not bad input).
pub fn verify_poseidon(
    public: &EddsaPublicKey,
    msg: Fq,
    sig: &EddsaSignature,
) -> Result<bool, EddsaError> {
    let hm = poseidon5(sig.r8.x, sig.r8.y, public.ax(), public.ay(), msg)?;
    let hm_scalar = ScalarField::from_le_bytes_mod_order(&hm.into_bigint().to_bytes_le());

    let lhs: EdwardsProjective = EdwardsAffine::generator() * sig.s;
    let rhs: EdwardsProjective = EdwardsProjective::from(sig.r8) + public.0 * hm_scalar;

    Ok(lhs.into_affine() == rhs.into_affine())
}
