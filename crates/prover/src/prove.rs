//! Proof generation for identity circuits.

use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::Groth16;
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use identity_circuits::{
    poseidon::poseidon_hash_two, CircuitError, CircuitId, PublicKey, Signature,
    StateTransitionCircuit,
};

use crate::proof::ZkProof;
use crate::setup::CircuitKeys;
use crate::verify::verify_zk_proof;

/// Errors during proof generation
#[derive(Error, Debug)]
pub enum ProverError {
    #[error("No prover available for circuit {0}")]
    UnsupportedCircuit(CircuitId),
    #[error("Invalid circuit inputs: {0}")]
    InvalidInputs(String),
    #[error("Challenge signature does not verify against the auth claim key")]
    InvalidSignature,
    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),
    #[error("Verification failed: {0}")]
    Verification(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error(transparent)]
    Circuit(#[from] CircuitError),
}

/// Native prover seam: marshaled circuit inputs in, proof and public signals out.
#[async_trait]
pub trait Prover: Send + Sync {
    async fn generate(&self, inputs: &[u8], circuit_id: CircuitId)
        -> Result<ZkProof, ProverError>;

    async fn verify(&self, proof: &ZkProof, circuit_id: CircuitId) -> Result<bool, ProverError>;
}

/// Groth16 prover over BN254 for circuits that have keys in [`CircuitKeys`].
#[derive(Clone)]
pub struct Groth16Prover {
    keys: Arc<CircuitKeys>,
}

impl Groth16Prover {
    pub fn new(keys: Arc<CircuitKeys>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &CircuitKeys {
        &self.keys
    }

    /// Prove a state transition from marshaled `StateTransitionInputs`.
    ///
    /// The challenge signature `sign(H(oldUserState, newUserState))` is checked
    /// natively against the auth claim key before proving.
    pub fn prove_state_transition(&self, inputs: &[u8]) -> Result<ZkProof, ProverError> {
        let pair = self
            .keys
            .get(CircuitId::StateTransition)
            .ok_or(ProverError::UnsupportedCircuit(CircuitId::StateTransition))?;

        let circuit = StateTransitionCircuit::from_marshaled(inputs, self.keys.depth())?;
        check_challenge_signature(inputs, &circuit)?;

        let public_inputs = circuit.public_inputs();
        let mut rng = StdRng::from_entropy();
        let proof = Groth16::<Bn254>::prove(&pair.proving_key, circuit, &mut rng)
            .map_err(|e| ProverError::ProofGeneration(e.to_string()))?;

        let zk = ZkProof::new(&proof, &public_inputs);
        // An unsatisfied witness still yields a proof; it just never verifies.
        if !verify_zk_proof(&pair.verifying_key, &zk)? {
            return Err(ProverError::ProofGeneration(
                "witness does not satisfy the state transition circuit".into(),
            ));
        }
        Ok(zk)
    }

    pub fn verify_sync(&self, proof: &ZkProof, circuit_id: CircuitId) -> Result<bool, ProverError> {
        let pair = self
            .keys
            .get(circuit_id)
            .ok_or(ProverError::UnsupportedCircuit(circuit_id))?;
        verify_zk_proof(&pair.verifying_key, proof)
    }
}

fn check_challenge_signature(
    inputs: &[u8],
    circuit: &StateTransitionCircuit,
) -> Result<(), ProverError> {
    let json: Value =
        serde_json::from_slice(inputs).map_err(|e| ProverError::InvalidInputs(e.to_string()))?;
    let field = |key: &str| {
        json.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ProverError::InvalidInputs(format!("missing signal {key}")))
    };
    let signature = Signature::from_marshaled(
        field("signatureR8x")?,
        field("signatureR8y")?,
        field("signatureS")?,
    )?;

    // BJJ auth claims keep the key in index slots 2 and 3.
    let key = PublicKey::from_coordinates(circuit.auth_claim[2], circuit.auth_claim[3])?;
    let challenge = poseidon_hash_two(circuit.old_state, circuit.new_state);
    if !key.verify_poseidon(challenge, &signature) {
        return Err(ProverError::InvalidSignature);
    }
    Ok(())
}

#[async_trait]
impl Prover for Groth16Prover {
    async fn generate(
        &self,
        inputs: &[u8],
        circuit_id: CircuitId,
    ) -> Result<ZkProof, ProverError> {
        info!(circuit = %circuit_id, "Generating proof");
        match circuit_id {
            CircuitId::StateTransition => {
                let proof = self.prove_state_transition(inputs)?;
                debug!(signals = proof.pub_signals.len(), "Proof generated");
                Ok(proof)
            }
            other => Err(ProverError::UnsupportedCircuit(other)),
        }
    }

    async fn verify(&self, proof: &ZkProof, circuit_id: CircuitId) -> Result<bool, ProverError> {
        self.verify_sync(proof, circuit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use identity_circuits::{
        CoreClaim, DidType, Hash, Id, PrivateKey, SchemaHash, SparseMerkleTree,
        StateTransitionInputs, TreeState,
    };

    const DEPTH: usize = 8;

    fn prover() -> Groth16Prover {
        let mut rng = StdRng::seed_from_u64(42);
        Groth16Prover::new(Arc::new(CircuitKeys::setup(DEPTH, &mut rng).unwrap()))
    }

    /// Genesis identity that adds one claim, signed with `signer`.
    fn transition(signer: &PrivateKey) -> StateTransitionInputs {
        let key = PrivateKey::from_bytes([9u8; 32]).unwrap();
        let mut auth = CoreClaim::new(SchemaHash::AUTH_BJJ);
        auth.set_index_data_slots(key.public().x(), key.public().y());

        let mut claims = SparseMerkleTree::new(DEPTH).unwrap();
        claims.add(auth.h_index(), auth.h_value()).unwrap();
        let old = TreeState::from_roots(Hash(claims.root()), Hash::zero(), Hash::zero());
        let id = Id::genesis_from_state(DidType::IDEN3_POLYGON_MUMBAI, old.state.0);
        let (inc, _) = claims.generate_proof(auth.h_index()).unwrap();
        let (non_rev, _) = SparseMerkleTree::new(DEPTH)
            .unwrap()
            .generate_proof(Fr::from(auth.revocation_nonce()))
            .unwrap();

        claims.add(Fr::from(11u64), Fr::from(12u64)).unwrap();
        let new = TreeState::from_roots(Hash(claims.root()), Hash::zero(), old.claims_root);
        let (new_inc, _) = claims.generate_proof(auth.h_index()).unwrap();

        StateTransitionInputs {
            id,
            old_tree_state: old,
            new_tree_state: new,
            is_old_state_genesis: true,
            auth_claim: auth,
            auth_claim_inc_mtp: inc,
            auth_claim_non_rev_mtp: non_rev,
            auth_claim_new_state_inc_mtp: new_inc,
            signature: signer.sign_poseidon(poseidon_hash_two(old.state.0, new.state.0)),
        }
    }

    #[tokio::test]
    async fn test_prove_and_verify_state_transition() {
        let prover = prover();
        let key = PrivateKey::from_bytes([9u8; 32]).unwrap();
        let inputs = transition(&key);
        let bytes = inputs.inputs_marshal().unwrap();

        let proof = prover.generate(&bytes, CircuitId::StateTransition).await.unwrap();
        assert_eq!(proof.pub_signals.len(), 4);
        assert_eq!(proof.pub_signals[1], inputs.old_tree_state.state.to_decimal());
        assert_eq!(proof.pub_signals[3], "1");
        assert!(prover.verify(&proof, CircuitId::StateTransition).await.unwrap());

        let mut tampered = proof.clone();
        tampered.pub_signals[2] = "1".into();
        assert!(!prover.verify(&tampered, CircuitId::StateTransition).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_signer_rejected() {
        let prover = prover();
        let stranger = PrivateKey::from_bytes([10u8; 32]).unwrap();
        let bytes = transition(&stranger).inputs_marshal().unwrap();

        let result = prover.generate(&bytes, CircuitId::StateTransition).await;
        assert!(matches!(result, Err(ProverError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_unsupported_circuit() {
        let prover = prover();
        let result = prover.generate(b"{}", CircuitId::AtomicQueryMtpV2).await;
        assert!(matches!(
            result,
            Err(ProverError::UnsupportedCircuit(CircuitId::AtomicQueryMtpV2))
        ));
    }

    #[tokio::test]
    async fn test_malformed_inputs() {
        let prover = prover();
        let result = prover.generate(b"not json", CircuitId::StateTransition).await;
        assert!(matches!(result, Err(ProverError::Circuit(_))));
    }
}
