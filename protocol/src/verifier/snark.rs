//! # snarkjs Wire Formats
//!
//! Groth16 proofs and verification keys arrive as snarkjs JSON: curve
//! points as arrays of decimal strings, G1 in projective triples, G2 as
//! pairs of Fq2 coordinate pairs. This module converts between that
//! format and arkworks types, with validation at every step — a point
//! that is not on the curve never reaches the pairing.
//!
//! snarkjs always emits normalized points (`z = 1`, or the identity
//! encoding `z = 0`), so we accept exactly those two cases instead of
//! implementing general projective normalization.

use ark_bn254::{Bn254, Fq, Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_groth16::{Proof, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing snarkjs-format material.
#[derive(Debug, Error)]
pub enum SnarkError {
    #[error("{context}: expected {expected} coordinates, got {got}")]
    BadCoordinateCount {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{context}: not a decimal base-field element: {value:?}")]
    InvalidFieldElement {
        context: &'static str,
        value: String,
    },

    #[error("{context}: projective z must be 0 or 1, got {value:?}")]
    UnsupportedProjective {
        context: &'static str,
        value: String,
    },

    #[error("{context}: point is not on the curve (or wrong subgroup)")]
    NotOnCurve { context: &'static str },

    #[error("unsupported protocol {0:?}: only groth16 is accepted")]
    UnsupportedProtocol(String),

    #[error("verification key has no IC entries")]
    EmptyIc,
}

/// A Groth16 proof in snarkjs JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofJson {
    /// G1, projective decimal triple.
    pub pi_a: Vec<String>,
    /// G2, three pairs of decimal strings.
    pub pi_b: Vec<Vec<String>>,
    /// G1, projective decimal triple.
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

/// A Groth16 verification key in snarkjs JSON form (the output of
/// `snarkjs zkey export verificationkey`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyingKeyJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    #[serde(rename = "nPublic", default, skip_serializing_if = "Option::is_none")]
    pub n_public: Option<usize>,
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

fn fq(value: &str, context: &'static str) -> Result<Fq, SnarkError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SnarkError::InvalidFieldElement {
            context,
            value: value.to_string(),
        });
    }
    Fq::from_str(value).map_err(|_| SnarkError::InvalidFieldElement {
        context,
        value: value.to_string(),
    })
}

/// Parse a projective G1 triple (or affine pair) into a checked point.
pub fn g1_from_json(coords: &[String], context: &'static str) -> Result<G1Affine, SnarkError> {
    if coords.len() != 2 && coords.len() != 3 {
        return Err(SnarkError::BadCoordinateCount {
            context,
            expected: 3,
            got: coords.len(),
        });
    }

    if coords.len() == 3 {
        match coords[2].as_str() {
            "1" => {}
            "0" => return Ok(G1Affine::identity()),
            other => {
                return Err(SnarkError::UnsupportedProjective {
                    context,
                    value: other.to_string(),
                })
            }
        }
    }

    let point = G1Affine::new_unchecked(fq(&coords[0], context)?, fq(&coords[1], context)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SnarkError::NotOnCurve { context });
    }
    Ok(point)
}

/// Parse a G2 point given as pairs `[[x0, x1], [y0, y1], [z0, z1]]`.
pub fn g2_from_json(coords: &[Vec<String>], context: &'static str) -> Result<G2Affine, SnarkError> {
    if coords.len() != 2 && coords.len() != 3 {
        return Err(SnarkError::BadCoordinateCount {
            context,
            expected: 3,
            got: coords.len(),
        });
    }
    for pair in coords {
        if pair.len() != 2 {
            return Err(SnarkError::BadCoordinateCount {
                context,
                expected: 2,
                got: pair.len(),
            });
        }
    }

    if coords.len() == 3 {
        let z0 = coords[2][0].as_str();
        let z1 = coords[2][1].as_str();
        match (z0, z1) {
            ("1", "0") => {}
            ("0", "0") => return Ok(G2Affine::identity()),
            _ => {
                return Err(SnarkError::UnsupportedProjective {
                    context,
                    value: format!("[{z0}, {z1}]"),
                })
            }
        }
    }

    let x = Fq2::new(fq(&coords[0][0], context)?, fq(&coords[0][1], context)?);
    let y = Fq2::new(fq(&coords[1][0], context)?, fq(&coords[1][1], context)?);

    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SnarkError::NotOnCurve { context });
    }
    Ok(point)
}

fn g1_to_json(point: &G1Affine) -> Vec<String> {
    if point.is_zero() {
        return vec!["0".into(), "1".into(), "0".into()];
    }
    vec![point.x.to_string(), point.y.to_string(), "1".into()]
}

fn g2_to_json(point: &G2Affine) -> Vec<Vec<String>> {
    if point.is_zero() {
        return vec![
            vec!["0".into(), "0".into()],
            vec!["1".into(), "0".into()],
            vec!["0".into(), "0".into()],
        ];
    }
    vec![
        vec![point.x.c0.to_string(), point.x.c1.to_string()],
        vec![point.y.c0.to_string(), point.y.c1.to_string()],
        vec!["1".into(), "0".into()],
    ]
}

impl ProofJson {
    /// Convert to the arkworks proof, validating every point.
    pub fn to_ark(&self) -> Result<Proof<Bn254>, SnarkError> {
        if let Some(protocol) = &self.protocol {
            if protocol != "groth16" {
                return Err(SnarkError::UnsupportedProtocol(protocol.clone()));
            }
        }
        Ok(Proof {
            a: g1_from_json(&self.pi_a, "pi_a")?,
            b: g2_from_json(&self.pi_b, "pi_b")?,
            c: g1_from_json(&self.pi_c, "pi_c")?,
        })
    }

    /// Render an arkworks proof in snarkjs form.
    pub fn from_ark(proof: &Proof<Bn254>) -> Self {
        Self {
            pi_a: g1_to_json(&proof.a),
            pi_b: g2_to_json(&proof.b),
            pi_c: g1_to_json(&proof.c),
            protocol: Some("groth16".into()),
            curve: Some("bn128".into()),
        }
    }
}

impl VerifyingKeyJson {
    /// Convert to the arkworks verification key, validating every point.
    pub fn to_ark(&self) -> Result<VerifyingKey<Bn254>, SnarkError> {
        if let Some(protocol) = &self.protocol {
            if protocol != "groth16" {
                return Err(SnarkError::UnsupportedProtocol(protocol.clone()));
            }
        }
        if self.ic.is_empty() {
            return Err(SnarkError::EmptyIc);
        }

        let gamma_abc_g1 = self
            .ic
            .iter()
            .map(|coords| g1_from_json(coords, "IC"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VerifyingKey {
            alpha_g1: g1_from_json(&self.vk_alpha_1, "vk_alpha_1")?,
            beta_g2: g2_from_json(&self.vk_beta_2, "vk_beta_2")?,
            gamma_g2: g2_from_json(&self.vk_gamma_2, "vk_gamma_2")?,
            delta_g2: g2_from_json(&self.vk_delta_2, "vk_delta_2")?,
            gamma_abc_g1,
        })
    }

    /// Render an arkworks verification key in snarkjs form.
    pub fn from_ark(vk: &VerifyingKey<Bn254>) -> Self {
        Self {
            protocol: Some("groth16".into()),
            curve: Some("bn128".into()),
            n_public: Some(vk.gamma_abc_g1.len().saturating_sub(1)),
            vk_alpha_1: g1_to_json(&vk.alpha_g1),
            vk_beta_2: g2_to_json(&vk.beta_g2),
            vk_gamma_2: g2_to_json(&vk.gamma_g2),
            vk_delta_2: g2_to_json(&vk.delta_g2),
            ic: vk.gamma_abc_g1.iter().map(g1_to_json).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;
    use ark_std::UniformRand;

    fn rng() -> ark_std::rand::rngs::StdRng {
        use ark_std::rand::SeedableRng;
        ark_std::rand::rngs::StdRng::seed_from_u64(99)
    }

    #[test]
    fn g1_roundtrip() {
        let mut rng = rng();
        let point = ark_bn254::G1Projective::rand(&mut rng).into_affine();
        let json = g1_to_json(&point);
        let back = g1_from_json(&json, "test").unwrap();
        assert_eq!(point, back);
    }

    #[test]
    fn g2_roundtrip() {
        let mut rng = rng();
        let point = ark_bn254::G2Projective::rand(&mut rng).into_affine();
        let json = g2_to_json(&point);
        let back = g2_from_json(&json, "test").unwrap();
        assert_eq!(point, back);
    }

    #[test]
    fn g1_identity_encoding() {
        let json = vec!["0".to_string(), "1".to_string(), "0".to_string()];
        assert!(g1_from_json(&json, "test").unwrap().is_zero());
    }

    #[test]
    fn off_curve_g1_rejected() {
        let json = vec!["1".to_string(), "1".to_string(), "1".to_string()];
        assert!(matches!(
            g1_from_json(&json, "test"),
            Err(SnarkError::NotOnCurve { .. })
        ));
    }

    #[test]
    fn non_normalized_z_rejected() {
        let mut rng = rng();
        let point = ark_bn254::G1Projective::rand(&mut rng).into_affine();
        let mut json = g1_to_json(&point);
        json[2] = "2".to_string();
        assert!(matches!(
            g1_from_json(&json, "test"),
            Err(SnarkError::UnsupportedProjective { .. })
        ));
    }

    #[test]
    fn garbage_coordinates_rejected() {
        let json = vec!["abc".to_string(), "1".to_string(), "1".to_string()];
        assert!(matches!(
            g1_from_json(&json, "test"),
            Err(SnarkError::InvalidFieldElement { .. })
        ));

        let json = vec!["1".to_string()];
        assert!(matches!(
            g1_from_json(&json, "test"),
            Err(SnarkError::BadCoordinateCount { .. })
        ));
    }

    #[test]
    fn wrong_protocol_rejected() {
        let proof = ProofJson {
            pi_a: vec!["0".into(), "1".into(), "0".into()],
            pi_b: vec![
                vec!["0".into(), "0".into()],
                vec!["1".into(), "0".into()],
                vec!["0".into(), "0".into()],
            ],
            pi_c: vec!["0".into(), "1".into(), "0".into()],
            protocol: Some("plonk".into()),
            curve: None,
        };
        assert!(matches!(
            proof.to_ark(),
            Err(SnarkError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn proof_json_field_names() {
        let proof = ProofJson {
            pi_a: vec!["0".into(), "1".into(), "0".into()],
            pi_b: vec![
                vec!["0".into(), "0".into()],
                vec!["1".into(), "0".into()],
                vec!["0".into(), "0".into()],
            ],
            pi_c: vec!["0".into(), "1".into(), "0".into()],
            protocol: Some("groth16".into()),
            curve: Some("bn128".into()),
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert!(json.get("pi_a").is_some());
        assert!(json.get("pi_b").is_some());
        assert_eq!(json["protocol"], "groth16");
    }

    #[test]
    fn vkey_json_rename_for_ic_and_n_public() {
        let raw = serde_json::json!({
            "protocol": "groth16",
            "nPublic": 1,
            "vk_alpha_1": ["0", "1", "0"],
            "vk_beta_2": [["0","0"],["1","0"],["0","0"]],
            "vk_gamma_2": [["0","0"],["1","0"],["0","0"]],
            "vk_delta_2": [["0","0"],["1","0"],["0","0"]],
            "IC": [["0","1","0"], ["0","1","0"]]
        });
        let vkey: VerifyingKeyJson = serde_json::from_value(raw).unwrap();
        assert_eq!(vkey.n_public, Some(1));
        assert_eq!(vkey.ic.len(), 2);
        // All-identity points still parse structurally.
        assert!(vkey.to_ark().is_ok());
    }

    #[test]
    fn empty_ic_rejected() {
        let vkey = VerifyingKeyJson {
            protocol: Some("groth16".into()),
            curve: None,
            n_public: Some(0),
            vk_alpha_1: vec!["0".into(), "1".into(), "0".into()],
            vk_beta_2: g2_to_json(&G2Affine::identity()),
            vk_gamma_2: g2_to_json(&G2Affine::identity()),
            vk_delta_2: g2_to_json(&G2Affine::identity()),
            ic: vec![],
        };
        assert!(matches!(vkey.to_ark(), Err(SnarkError::EmptyIc)));
    }
}
