//! # Local Proving Harness
//!
//! A stand-in for the real Circom KYC circuit, used in development and
//! tests. The production service consumes an externally ceremonied
//! verification key and never proves anything; this harness exists so
//! the *entire* verification pipeline — snarkjs JSON parsing, pairing
//! checks, nullifier registration, caching, aggregation — can run
//! end-to-end with genuine Groth16 proofs and no external artifacts.
//!
//! The constraint system is deliberately minimal: a private witness
//! bound to the credential-hash signal, with all seven KYC signals as
//! public inputs. That is NOT the KYC predicate — it is exactly enough
//! circuit for a proof to be valid when and only when it was generated
//! for those signal values. Verification key shape (7 public inputs)
//! matches the real circuit, so the rest of the stack cannot tell the
//! difference.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::lc;
use ark_relations::r1cs::{
    ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable,
};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};

use super::groth16::PublicSignals;
use super::snark::{ProofJson, VerifyingKeyJson};
use crate::config::KYC_SIGNAL_COUNT;
use crate::crypto::field::fr_from_decimal;

/// The harness circuit: seven public inputs, one witness, one
/// constraint tying the witness to the credential-hash input.
#[derive(Clone)]
struct DevCircuit {
    /// Private witness; must equal the credential-hash signal.
    secret: Option<Fr>,
    /// The seven public signals, wire order.
    signals: [Option<Fr>; KYC_SIGNAL_COUNT],
}

impl DevCircuit {
    fn blank() -> Self {
        Self {
            secret: None,
            signals: [None; KYC_SIGNAL_COUNT],
        }
    }
}

impl ConstraintSynthesizer<Fr> for DevCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let secret = cs.new_witness_variable(|| self.secret.ok_or(SynthesisError::AssignmentMissing))?;

        let mut inputs = Vec::with_capacity(KYC_SIGNAL_COUNT);
        for signal in self.signals {
            inputs.push(cs.new_input_variable(|| signal.ok_or(SynthesisError::AssignmentMissing))?);
        }

        // secret * 1 = credentialHash. One constraint; the instance
        // vector still binds all seven inputs through gamma_abc.
        cs.enforce_constraint(
            lc!() + secret,
            lc!() + Variable::One,
            lc!() + inputs[KYC_SIGNAL_COUNT - 1],
        )?;

        Ok(())
    }
}

/// Prover half of the harness: a locally generated CRS for the
/// [`DevCircuit`] shape.
pub struct DevProver {
    pk: ProvingKey<Bn254>,
    vk: VerifyingKey<Bn254>,
}

impl DevProver {
    /// Run the Groth16 setup for the harness circuit.
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(DevCircuit::blank(), rng)
            .expect("setup must succeed for a well-formed circuit");
        Self { pk, vk }
    }

    /// Seeded setup for reproducible tests.
    pub fn setup_deterministic() -> Self {
        let mut rng = StdRng::seed_from_u64(42);
        Self::setup(&mut rng)
    }

    /// The verification key for this harness CRS.
    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.vk
    }

    /// The verification key in snarkjs JSON form, as the real ceremony
    /// would export it.
    pub fn vkey_json(&self) -> VerifyingKeyJson {
        VerifyingKeyJson::from_ark(&self.vk)
    }

    /// Prove a signal vector. The proof verifies for exactly these
    /// seven values and nothing else.
    pub fn prove(&self, signals: [Fr; KYC_SIGNAL_COUNT]) -> ProofJson {
        let circuit = DevCircuit {
            secret: Some(signals[KYC_SIGNAL_COUNT - 1]),
            signals: signals.map(Some),
        };
        let mut rng = ark_std::rand::thread_rng();
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, &mut rng)
            .expect("satisfiable witness must prove");
        ProofJson::from_ark(&proof)
    }

    /// Convenience: prove from decimal strings, returning both wire
    /// halves ready for the pipeline.
    pub fn prove_signals(&self, values: &[&str; KYC_SIGNAL_COUNT]) -> (ProofJson, PublicSignals) {
        let elements: Vec<Fr> = values
            .iter()
            .map(|v| fr_from_decimal(v).expect("dev signals are decimal"))
            .collect();
        let signals: [Fr; KYC_SIGNAL_COUNT] = elements.try_into().unwrap();

        let proof = self.prove(signals);
        let public = PublicSignals::new(values.iter().map(|s| s.to_string()).collect())
            .expect("seven signals is within bounds");
        (proof, public)
    }
}
