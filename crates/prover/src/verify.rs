//! Local verification of snarkjs-shaped Groth16 proofs.

use ark_bn254::Bn254;
use ark_groth16::{Groth16, VerifyingKey};
use ark_snark::SNARK;

use crate::proof::ZkProof;
use crate::prove::ProverError;

/// Verify a proof against its own public signals.
///
/// Malformed points or signals are errors; a well-formed proof that does not
/// verify is `Ok(false)`.
pub fn verify_zk_proof(vk: &VerifyingKey<Bn254>, proof: &ZkProof) -> Result<bool, ProverError> {
    let public_inputs = proof.public_inputs()?;
    if public_inputs.len() != vk.gamma_abc_g1.len().saturating_sub(1) {
        return Ok(false);
    }
    let groth16 = proof.proof.to_groth16()?;

    Groth16::<Bn254>::verify(vk, &public_inputs, &groth16)
        .map_err(|e| ProverError::Verification(e.to_string()))
}
