//! State transition circuit.
//!
//! Proves that an identity moved from `oldUserState` to `newUserState` while
//! holding its auth claim in both the old and the new claims tree.
//!
//! Public inputs (in order):
//! - userID
//! - oldUserState
//! - newUserState
//! - isOldStateGenesis
//!
//! Witnesses:
//! - Old and new (claims, revocation, roots) tree roots
//! - The eight auth claim slots
//! - Auth claim inclusion proofs against the old and new claims roots
//!
//! The challenge signature is checked natively by the prover before proving.

use ark_bn254::Fr;
use ark_ff::Zero;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde_json::Value;

use crate::encoding::fr_from_decimal;
use crate::error::CircuitError;
use crate::hash::Hash;
use crate::inputs::StateTransitionInputs;
use crate::poseidon::poseidon_hash_many_var;
use crate::smt::{verify_inclusion, Proof, ProofVar};

/// Number of public inputs the circuit exposes.
pub const STATE_TRANSITION_PUBLIC_INPUTS: usize = 4;

#[derive(Clone, Debug)]
pub struct StateTransitionCircuit {
    /// Claims tree depth the circuit is built for
    pub depth: usize,

    // Public inputs
    pub user_id: Fr,
    pub old_state: Fr,
    pub new_state: Fr,
    pub is_old_state_genesis: bool,

    // Witnesses
    /// Old (claims, revocation, roots) roots
    pub old_roots: [Fr; 3],
    /// New (claims, revocation, roots) roots
    pub new_roots: [Fr; 3],
    pub auth_claim: [Fr; 8],
    pub auth_claim_mtp: Proof,
    pub new_auth_claim_mtp: Proof,
}

impl StateTransitionCircuit {
    /// Circuit with placeholder values, used for key generation.
    pub fn empty(depth: usize) -> Self {
        let dummy = Proof::existence(vec![Hash::zero(); depth]);
        Self {
            depth,
            user_id: Fr::zero(),
            old_state: Fr::zero(),
            new_state: Fr::zero(),
            is_old_state_genesis: false,
            old_roots: [Fr::zero(); 3],
            new_roots: [Fr::zero(); 3],
            auth_claim: [Fr::zero(); 8],
            auth_claim_mtp: dummy.clone(),
            new_auth_claim_mtp: dummy,
        }
    }

    pub fn from_inputs(inputs: &StateTransitionInputs, depth: usize) -> Self {
        let roots = |ts: &crate::tree_state::TreeState| {
            [ts.claims_root.0, ts.revocation_root.0, ts.root_of_roots.0]
        };
        Self {
            depth,
            user_id: inputs.id.to_fr(),
            old_state: inputs.old_tree_state.state.0,
            new_state: inputs.new_tree_state.state.0,
            is_old_state_genesis: inputs.is_old_state_genesis,
            old_roots: roots(&inputs.old_tree_state),
            new_roots: roots(&inputs.new_tree_state),
            auth_claim: inputs.auth_claim.slots(),
            auth_claim_mtp: inputs.auth_claim_inc_mtp.clone(),
            new_auth_claim_mtp: inputs.auth_claim_new_state_inc_mtp.clone(),
        }
    }

    /// Rebuild the witness from marshaled circuit inputs.
    pub fn from_marshaled(bytes: &[u8], depth: usize) -> Result<Self, CircuitError> {
        let json: Value =
            serde_json::from_slice(bytes).map_err(|e| CircuitError::Marshal(e.to_string()))?;

        let claim = signal_list(&json, "authClaim")?;
        let auth_claim: [Fr; 8] = claim
            .try_into()
            .map_err(|_| CircuitError::Marshal("authClaim must have 8 slots".into()))?;

        Ok(Self {
            depth,
            user_id: signal(&json, "userID")?,
            old_state: signal(&json, "oldUserState")?,
            new_state: signal(&json, "newUserState")?,
            is_old_state_genesis: match signal_str(&json, "isOldStateGenesis")? {
                "0" => false,
                "1" => true,
                other => {
                    return Err(CircuitError::Marshal(format!(
                        "isOldStateGenesis must be 0 or 1, got {other}"
                    )))
                }
            },
            old_roots: [
                signal(&json, "claimsTreeRoot")?,
                signal(&json, "revTreeRoot")?,
                signal(&json, "rootsTreeRoot")?,
            ],
            new_roots: [
                signal(&json, "newClaimsTreeRoot")?,
                signal(&json, "newRevTreeRoot")?,
                signal(&json, "newRootsTreeRoot")?,
            ],
            auth_claim,
            auth_claim_mtp: siblings_proof(&json, "authClaimMtp")?,
            new_auth_claim_mtp: siblings_proof(&json, "newAuthClaimMtp")?,
        })
    }

    /// Public inputs in circuit order.
    pub fn public_inputs(&self) -> Vec<Fr> {
        vec![
            self.user_id,
            self.old_state,
            self.new_state,
            Fr::from(self.is_old_state_genesis as u64),
        ]
    }
}

fn signal_str<'a>(json: &'a Value, key: &str) -> Result<&'a str, CircuitError> {
    json.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CircuitError::Marshal(format!("missing signal {key}")))
}

fn signal(json: &Value, key: &str) -> Result<Fr, CircuitError> {
    fr_from_decimal(signal_str(json, key)?)
}

fn signal_list(json: &Value, key: &str) -> Result<Vec<Fr>, CircuitError> {
    json.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| CircuitError::Marshal(format!("missing signal list {key}")))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| CircuitError::Marshal(format!("{key} must hold strings")))
                .and_then(fr_from_decimal)
        })
        .collect()
}

fn siblings_proof(json: &Value, key: &str) -> Result<Proof, CircuitError> {
    let siblings = signal_list(json, key)?.into_iter().map(Hash).collect();
    Ok(Proof::existence(siblings))
}

impl ConstraintSynthesizer<Fr> for StateTransitionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // === Public inputs ===
        let _user_id_var = FpVar::new_input(cs.clone(), || Ok(self.user_id))?;
        let old_state_var = FpVar::new_input(cs.clone(), || Ok(self.old_state))?;
        let new_state_var = FpVar::new_input(cs.clone(), || Ok(self.new_state))?;
        let is_genesis_input =
            FpVar::new_input(cs.clone(), || Ok(Fr::from(self.is_old_state_genesis as u64)))?;

        // === Witnesses ===
        let old_roots = self
            .old_roots
            .iter()
            .map(|r| FpVar::new_witness(cs.clone(), || Ok(*r)))
            .collect::<Result<Vec<_>, _>>()?;
        let new_roots = self
            .new_roots
            .iter()
            .map(|r| FpVar::new_witness(cs.clone(), || Ok(*r)))
            .collect::<Result<Vec<_>, _>>()?;
        let claim = self
            .auth_claim
            .iter()
            .map(|s| FpVar::new_witness(cs.clone(), || Ok(*s)))
            .collect::<Result<Vec<_>, _>>()?;
        let is_genesis = Boolean::new_witness(cs.clone(), || Ok(self.is_old_state_genesis))?;
        let old_mtp = ProofVar::new_witness(cs.clone(), &self.auth_claim_mtp, self.depth)?;
        let new_mtp = ProofVar::new_witness(cs.clone(), &self.new_auth_claim_mtp, self.depth)?;

        // === Constraint 1: genesis flag is boolean ===
        FpVar::from(is_genesis).enforce_equal(&is_genesis_input)?;

        // === Constraint 2: states open to their roots ===
        poseidon_hash_many_var(cs.clone(), &old_roots)?.enforce_equal(&old_state_var)?;
        poseidon_hash_many_var(cs.clone(), &new_roots)?.enforce_equal(&new_state_var)?;

        // === Constraint 3: the state actually changes ===
        old_state_var.enforce_not_equal(&new_state_var)?;

        // === Constraint 4: auth claim is in both claims trees ===
        let h_index = poseidon_hash_many_var(cs.clone(), &claim[..4])?;
        let h_value = poseidon_hash_many_var(cs.clone(), &claim[4..])?;
        verify_inclusion(cs.clone(), &old_roots[0], &h_index, &h_value, &old_mtp)?;
        verify_inclusion(cs, &new_roots[0], &h_index, &h_value, &new_mtp)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{CoreClaim, SchemaHash};
    use crate::smt::SparseMerkleTree;
    use crate::tree_state::TreeState;
    use ark_relations::r1cs::ConstraintSystem;

    const DEPTH: usize = 8;

    fn transition() -> StateTransitionCircuit {
        let mut claim = CoreClaim::new(SchemaHash::AUTH_BJJ);
        claim.set_index_data_slots(Fr::from(3u64), Fr::from(4u64));

        let mut tree = SparseMerkleTree::new(DEPTH).unwrap();
        let old_root = tree.add(claim.h_index(), claim.h_value()).unwrap();
        let (old_mtp, _) = tree.generate_proof(claim.h_index()).unwrap();
        let new_root = tree.add(Fr::from(77u64), Fr::from(1u64)).unwrap();
        let (new_mtp, _) = tree.generate_proof(claim.h_index()).unwrap();

        let old = TreeState::from_roots(Hash(old_root), Hash::zero(), Hash::zero());
        let new = TreeState::from_roots(Hash(new_root), Hash::zero(), Hash(old_root));

        StateTransitionCircuit {
            depth: DEPTH,
            user_id: Fr::from(1234u64),
            old_state: old.state.0,
            new_state: new.state.0,
            is_old_state_genesis: true,
            old_roots: [old_root, Fr::zero(), Fr::zero()],
            new_roots: [new_root, Fr::zero(), old_root],
            auth_claim: claim.slots(),
            auth_claim_mtp: old_mtp,
            new_auth_claim_mtp: new_mtp,
        }
    }

    #[test]
    fn test_valid_transition_satisfied() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        transition().generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap());
        assert_eq!(cs.num_instance_variables(), STATE_TRANSITION_PUBLIC_INPUTS + 1);
    }

    #[test]
    fn test_wrong_new_state_rejected() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let mut circuit = transition();
        circuit.new_state += Fr::from(1u64);
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_auth_claim_missing_from_new_tree_rejected() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let mut circuit = transition();
        circuit.auth_claim[7] = Fr::from(9u64);
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_unchanged_state_rejected() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let mut circuit = transition();
        circuit.new_state = circuit.old_state;
        circuit.new_roots = circuit.old_roots;
        circuit.new_auth_claim_mtp = circuit.auth_claim_mtp.clone();
        // the inequality gadget cannot even assign a witness here
        let result = circuit.generate_constraints(cs.clone());
        assert!(result.is_err() || !cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_missing_signal_rejected() {
        let err = StateTransitionCircuit::from_marshaled(b"{}", DEPTH).unwrap_err();
        assert!(matches!(err, CircuitError::Marshal(_)));
    }
}
