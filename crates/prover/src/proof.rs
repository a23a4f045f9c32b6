//! snarkjs-shaped Groth16 proofs.
//!
//! Coordinates are decimal strings. G1 points are `[x, y, "1"]`, G2 points
//! `[[x.c0, x.c1], [y.c0, y.c1], ["1", "0"]]`, and the point at infinity is
//! encoded with a zero third coordinate.

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};

use identity_circuits::encoding::{field_from_decimal, field_to_decimal, fr_from_decimal};

use crate::prove::ProverError;

pub const PROTOCOL: &str = "groth16";
pub const CURVE: &str = "bn128";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub protocol: String,
    pub curve: String,
}

/// A proof together with its public signals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkProof {
    pub proof: ProofData,
    pub pub_signals: Vec<String>,
}

impl ZkProof {
    pub fn new(proof: &Proof<Bn254>, public_inputs: &[Fr]) -> Self {
        Self {
            proof: ProofData::from_groth16(proof),
            pub_signals: public_inputs.iter().map(field_to_decimal).collect(),
        }
    }

    /// Public signals parsed back into field elements.
    pub fn public_inputs(&self) -> Result<Vec<Fr>, ProverError> {
        self.pub_signals
            .iter()
            .map(|s| fr_from_decimal(s).map_err(ProverError::from))
            .collect()
    }
}

impl ProofData {
    pub fn from_groth16(proof: &Proof<Bn254>) -> Self {
        Self {
            pi_a: g1_to_strings(&proof.a),
            pi_b: g2_to_strings(&proof.b),
            pi_c: g1_to_strings(&proof.c),
            protocol: PROTOCOL.to_string(),
            curve: CURVE.to_string(),
        }
    }

    pub fn to_groth16(&self) -> Result<Proof<Bn254>, ProverError> {
        if self.protocol != PROTOCOL || self.curve != CURVE {
            return Err(ProverError::Serialization(format!(
                "unsupported proof system {}/{}",
                self.protocol, self.curve
            )));
        }
        Ok(Proof {
            a: g1_from_strings(&self.pi_a)?,
            b: g2_from_strings(&self.pi_b)?,
            c: g1_from_strings(&self.pi_c)?,
        })
    }
}

fn g1_to_strings(p: &G1Affine) -> Vec<String> {
    if p.infinity {
        return vec!["0".into(), "1".into(), "0".into()];
    }
    vec![field_to_decimal(&p.x), field_to_decimal(&p.y), "1".into()]
}

fn g2_to_strings(p: &G2Affine) -> Vec<Vec<String>> {
    if p.infinity {
        return vec![
            vec!["0".into(), "0".into()],
            vec!["1".into(), "0".into()],
            vec!["0".into(), "0".into()],
        ];
    }
    vec![
        vec![field_to_decimal(&p.x.c0), field_to_decimal(&p.x.c1)],
        vec![field_to_decimal(&p.y.c0), field_to_decimal(&p.y.c1)],
        vec!["1".into(), "0".into()],
    ]
}

fn fq(s: &str) -> Result<Fq, ProverError> {
    field_from_decimal(s).map_err(ProverError::from)
}

fn g1_from_strings(coords: &[String]) -> Result<G1Affine, ProverError> {
    let [x, y, z] = coords else {
        return Err(ProverError::Serialization("G1 point needs 3 coordinates".into()));
    };
    if z == "0" {
        return Ok(G1Affine::zero());
    }
    let p = G1Affine::new_unchecked(fq(x)?, fq(y)?);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::Serialization("G1 point is not on the curve".into()));
    }
    Ok(p)
}

fn g2_from_strings(coords: &[Vec<String>]) -> Result<G2Affine, ProverError> {
    let [x, y, z] = coords else {
        return Err(ProverError::Serialization("G2 point needs 3 coordinates".into()));
    };
    let fq2 = |c: &Vec<String>| -> Result<Fq2, ProverError> {
        match c.as_slice() {
            [c0, c1] => Ok(Fq2::new(fq(c0)?, fq(c1)?)),
            _ => Err(ProverError::Serialization(
                "G2 coordinate needs 2 components".into(),
            )),
        }
    };
    if z.iter().all(|c| c == "0") {
        return Ok(G2Affine::zero());
    }
    let p = G2Affine::new_unchecked(fq2(x)?, fq2(y)?);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProverError::Serialization("G2 point is not on the curve".into()));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;
    use ark_std::UniformRand;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    fn random_proof() -> Proof<Bn254> {
        let mut rng = StdRng::seed_from_u64(7);
        Proof {
            a: ark_bn254::G1Projective::rand(&mut rng).into_affine(),
            b: ark_bn254::G2Projective::rand(&mut rng).into_affine(),
            c: ark_bn254::G1Projective::rand(&mut rng).into_affine(),
        }
    }

    #[test]
    fn test_snarkjs_shape() {
        let zk = ZkProof::new(&random_proof(), &[Fr::from(3u64)]);
        let json = serde_json::to_value(&zk).unwrap();

        assert_eq!(json["proof"]["protocol"], "groth16");
        assert_eq!(json["proof"]["curve"], "bn128");
        assert_eq!(json["proof"]["pi_a"][2], "1");
        assert_eq!(json["proof"]["pi_b"][2][0], "1");
        assert_eq!(json["pub_signals"][0], "3");
    }

    #[test]
    fn test_proof_parses_back() {
        let proof = random_proof();
        let data = ProofData::from_groth16(&proof);
        assert_eq!(data.to_groth16().unwrap(), proof);
    }

    #[test]
    fn test_off_curve_point_rejected() {
        let mut data = ProofData::from_groth16(&random_proof());
        data.pi_a[1] = "5".into();
        assert!(matches!(
            data.to_groth16(),
            Err(ProverError::Serialization(_))
        ));

        let mut data = ProofData::from_groth16(&random_proof());
        data.protocol = "plonk".into();
        assert!(data.to_groth16().is_err());
    }
}
