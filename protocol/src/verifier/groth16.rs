//! # Groth16 Proof Verification
//!
//! The verifier side of the KYC circuit. The verification key is loaded
//! once at boot from snarkjs JSON, prepared (pairing precomputation),
//! and held for the life of the process. Verification itself is three
//! pairings plus a multi-scalar multiplication — constant time in the
//! circuit size, well under 5ms on commodity hardware.
//!
//! [`PublicSignals`] owns the positional wire contract: the circuit
//! emits `[Ax, Ay, requiredAge, restrictedCountry, appId, nullifier,
//! credentialHash]` in that order, and the accessors here are the only
//! place in the codebase allowed to know the indices.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, VerifyingKey};
use ark_snark::SNARK;
use std::path::Path;
use thiserror::Error;

use super::snark::{ProofJson, SnarkError, VerifyingKeyJson};
use crate::config::{
    KYC_SIGNAL_COUNT, MAX_PUBLIC_SIGNALS, SIGNAL_APP_ID, SIGNAL_CREDENTIAL_HASH, SIGNAL_NULLIFIER,
};
use crate::crypto::field::{fr_from_decimal, FieldError};

/// Errors from signal handling and verification.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("public signals length {0} outside 1..={MAX_PUBLIC_SIGNALS}")]
    BadSignalCount(usize),

    #[error("kyc signal layout needs {KYC_SIGNAL_COUNT} signals, got {0}")]
    TruncatedSignals(usize),

    #[error("signal count mismatch: key expects {expected}, got {got}")]
    SignalCountMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Snark(#[from] SnarkError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("verification key unreadable: {0}")]
    VkeyIo(#[from] std::io::Error),

    #[error("verification key is not valid JSON: {0}")]
    VkeyJson(#[from] serde_json::Error),

    #[error("groth16 verification algorithm failed: {0}")]
    Algorithm(String),
}

/// The ordered public signals of a proof, as decimal strings.
///
/// Construction validates the boundary length limits; the typed
/// accessors validate the KYC layout. Index arithmetic happens here and
/// nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals(Vec<String>);

impl PublicSignals {
    /// Accept 1..=[`MAX_PUBLIC_SIGNALS`] signals.
    pub fn new(signals: Vec<String>) -> Result<Self, VerifierError> {
        if signals.is_empty() || signals.len() > MAX_PUBLIC_SIGNALS {
            return Err(VerifierError::BadSignalCount(signals.len()));
        }
        Ok(Self(signals))
    }

    /// The raw decimal strings, in wire order.
    pub fn raw(&self) -> &[String] {
        &self.0
    }

    /// Parse every signal into a field element.
    pub fn to_field_elements(&self) -> Result<Vec<Fr>, VerifierError> {
        self.0
            .iter()
            .map(|s| fr_from_decimal(s).map_err(VerifierError::from))
            .collect()
    }

    fn kyc_signal(&self, index: usize) -> Result<&str, VerifierError> {
        if self.0.len() < KYC_SIGNAL_COUNT {
            return Err(VerifierError::TruncatedSignals(self.0.len()));
        }
        Ok(&self.0[index])
    }

    /// The nullifier (index 5 of the KYC layout).
    pub fn nullifier(&self) -> Result<&str, VerifierError> {
        self.kyc_signal(SIGNAL_NULLIFIER)
    }

    /// The application id (index 4 of the KYC layout).
    pub fn app_id(&self) -> Result<&str, VerifierError> {
        self.kyc_signal(SIGNAL_APP_ID)
    }

    /// The credential hash (index 6 of the KYC layout).
    pub fn credential_hash(&self) -> Result<&str, VerifierError> {
        self.kyc_signal(SIGNAL_CREDENTIAL_HASH)
    }
}

/// Holds the prepared Groth16 verification key.
pub struct ProofVerifier {
    pvk: PreparedVerifyingKey<Bn254>,
}

impl ProofVerifier {
    /// Construct from an arkworks verification key (used by the local
    /// dev harness and by tests).
    pub fn from_ark_vk(vk: VerifyingKey<Bn254>) -> Self {
        Self {
            pvk: ark_groth16::prepare_verifying_key(&vk),
        }
    }

    /// Parse a snarkjs verification key JSON string.
    pub fn from_vkey_json(json: &str) -> Result<Self, VerifierError> {
        let vkey: VerifyingKeyJson = serde_json::from_str(json)?;
        Ok(Self::from_ark_vk(vkey.to_ark()?))
    }

    /// Load the verification key from a snarkjs JSON file.
    pub fn from_vkey_file<P: AsRef<Path>>(path: P) -> Result<Self, VerifierError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_vkey_json(&raw)
    }

    /// Number of public inputs the key expects.
    pub fn num_public_inputs(&self) -> usize {
        self.pvk.vk.gamma_abc_g1.len().saturating_sub(1)
    }

    /// Verify a proof against its public signals.
    ///
    /// `Ok(true)` means the proof verifies; `Ok(false)` means it is
    /// well-formed but wrong; `Err` means it never reached the pairing
    /// (malformed points, wrong signal count, algorithm failure).
    pub fn verify(&self, proof: &ProofJson, signals: &PublicSignals) -> Result<bool, VerifierError> {
        let ark_proof = proof.to_ark()?;
        let inputs = signals.to_field_elements()?;

        let expected = self.num_public_inputs();
        if inputs.len() != expected {
            return Err(VerifierError::SignalCountMismatch {
                expected,
                got: inputs.len(),
            });
        }

        Groth16::<Bn254>::verify_with_processed_vk(&self.pvk, &inputs, &ark_proof)
            .map_err(|e| VerifierError::Algorithm(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::dev::DevProver;

    fn signals(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn signal_length_bounds() {
        assert!(matches!(
            PublicSignals::new(vec![]),
            Err(VerifierError::BadSignalCount(0))
        ));
        assert!(matches!(
            PublicSignals::new(signals(51)),
            Err(VerifierError::BadSignalCount(51))
        ));
        assert!(PublicSignals::new(signals(1)).is_ok());
        assert!(PublicSignals::new(signals(50)).is_ok());
    }

    #[test]
    fn positional_accessors() {
        let sig = PublicSignals::new(vec![
            "10".into(), // Ax
            "11".into(), // Ay
            "18".into(), // requiredAge
            "408".into(), // restrictedCountry
            "77".into(), // appId
            "5555".into(), // nullifier
            "9999".into(), // credentialHash
        ])
        .unwrap();

        assert_eq!(sig.app_id().unwrap(), "77");
        assert_eq!(sig.nullifier().unwrap(), "5555");
        assert_eq!(sig.credential_hash().unwrap(), "9999");
    }

    #[test]
    fn truncated_layout_rejected_by_accessors() {
        let sig = PublicSignals::new(signals(3)).unwrap();
        assert!(matches!(
            sig.nullifier(),
            Err(VerifierError::TruncatedSignals(3))
        ));
    }

    #[test]
    fn non_decimal_signal_fails_parsing() {
        let sig = PublicSignals::new(vec!["0x12".into()]).unwrap();
        assert!(matches!(
            sig.to_field_elements(),
            Err(VerifierError::Field(_))
        ));
    }

    #[test]
    fn valid_proof_verifies() {
        let prover = DevProver::setup_deterministic();
        let verifier = ProofVerifier::from_ark_vk(prover.verifying_key().clone());

        let (proof, sig) = prover.prove_signals(&["1", "2", "18", "408", "77", "555", "999"]);
        assert!(verifier.verify(&proof, &sig).unwrap());
    }

    #[test]
    fn altered_signal_fails_verification() {
        let prover = DevProver::setup_deterministic();
        let verifier = ProofVerifier::from_ark_vk(prover.verifying_key().clone());

        let (proof, _) = prover.prove_signals(&["1", "2", "18", "408", "77", "555", "999"]);
        let altered =
            PublicSignals::new(signals_vec(&["1", "2", "18", "408", "77", "555", "1000"])).unwrap();
        assert!(!verifier.verify(&proof, &altered).unwrap());
    }

    #[test]
    fn wrong_signal_count_is_an_error_not_false() {
        let prover = DevProver::setup_deterministic();
        let verifier = ProofVerifier::from_ark_vk(prover.verifying_key().clone());

        let (proof, _) = prover.prove_signals(&["1", "2", "18", "408", "77", "555", "999"]);
        let short = PublicSignals::new(signals_vec(&["1", "2"])).unwrap();
        assert!(matches!(
            verifier.verify(&proof, &short),
            Err(VerifierError::SignalCountMismatch { expected: 7, got: 2 })
        ));
    }

    #[test]
    fn vkey_json_roundtrip_through_snarkjs_form() {
        let prover = DevProver::setup_deterministic();
        let vkey_json = serde_json::to_string(&VerifyingKeyJson::from_ark(
            prover.verifying_key(),
        ))
        .unwrap();

        let verifier = ProofVerifier::from_vkey_json(&vkey_json).unwrap();
        assert_eq!(verifier.num_public_inputs(), 7);

        let (proof, sig) = prover.prove_signals(&["1", "2", "18", "408", "77", "555", "999"]);
        assert!(verifier.verify(&proof, &sig).unwrap());
    }

    #[test]
    fn vkey_file_loading_errors_are_distinct() {
        let missing = ProofVerifier::from_vkey_file("/nonexistent/vkey.json");
        assert!(matches!(missing, Err(VerifierError::VkeyIo(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vkey.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ProofVerifier::from_vkey_file(&path),
            Err(VerifierError::VkeyJson(_))
        ));
    }

    fn signals_vec(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }
}
