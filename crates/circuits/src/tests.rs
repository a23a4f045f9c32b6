//! End-to-end tests across the identity primitives and the state circuit.

use ark_bn254::{Bn254, Fr};
use ark_ff::Zero;
use ark_groth16::Groth16;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};

use crate::babyjub::PrivateKey;
use crate::claim::{CoreClaim, SchemaHash};
use crate::hash::Hash;
use crate::id::{Did, DidType, Id};
use crate::inputs::StateTransitionInputs;
use crate::poseidon::poseidon_hash_two;
use crate::smt::SparseMerkleTree;
use crate::state_transition::StateTransitionCircuit;
use crate::tree_state::TreeState;

const DEPTH: usize = 16;

struct Genesis {
    key: PrivateKey,
    auth_claim: CoreClaim,
    claims: SparseMerkleTree,
    tree_state: TreeState,
    id: Id,
}

fn genesis(seed: u8) -> Genesis {
    let key = PrivateKey::from_bytes([seed; 32]).unwrap();
    let public = key.public();
    let mut auth_claim = CoreClaim::new(SchemaHash::AUTH_BJJ);
    auth_claim.set_index_data_slots(public.x(), public.y());

    let mut claims = SparseMerkleTree::new(DEPTH).unwrap();
    claims.add(auth_claim.h_index(), auth_claim.h_value()).unwrap();
    let tree_state = TreeState::from_roots(Hash(claims.root()), Hash::zero(), Hash::zero());
    let id = Id::genesis_from_state(DidType::IDEN3_POLYGON_MUMBAI, tree_state.state.0);

    Genesis {
        key,
        auth_claim,
        claims,
        tree_state,
        id,
    }
}

fn transition_inputs(g: &mut Genesis) -> StateTransitionInputs {
    let old = g.tree_state;
    let (inc, _) = g.claims.generate_proof(g.auth_claim.h_index()).unwrap();
    let revocations = SparseMerkleTree::new(DEPTH).unwrap();
    let (non_rev, _) = revocations
        .generate_proof(Fr::from(g.auth_claim.revocation_nonce()))
        .unwrap();

    let mut issued = CoreClaim::new(SchemaHash([7u8; 16]));
    issued.set_index_id(&g.id).unwrap();
    g.claims.add(issued.h_index(), issued.h_value()).unwrap();
    let new = TreeState::from_roots(Hash(g.claims.root()), Hash::zero(), old.claims_root);
    let (new_inc, _) = g.claims.generate_proof(g.auth_claim.h_index()).unwrap();

    let challenge = poseidon_hash_two(old.state.0, new.state.0);
    StateTransitionInputs {
        id: g.id,
        old_tree_state: old,
        new_tree_state: new,
        is_old_state_genesis: true,
        auth_claim: g.auth_claim,
        auth_claim_inc_mtp: inc,
        auth_claim_non_rev_mtp: non_rev,
        auth_claim_new_state_inc_mtp: new_inc,
        signature: g.key.sign_poseidon(challenge),
    }
}

#[test]
fn test_genesis_id_binds_state() {
    let g = genesis(1);
    assert!(g.id.is_genesis_of(g.tree_state.state.0));
    assert!(g.tree_state.is_consistent());

    let did = Did::from_id(g.id).unwrap();
    assert_eq!(Did::parse(&did.to_string()).unwrap().id(), &g.id);
}

#[test]
fn test_marshaled_inputs_rebuild_satisfying_circuit() {
    let mut g = genesis(2);
    let inputs = transition_inputs(&mut g);
    let bytes = inputs.inputs_marshal().unwrap();

    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["isOldStateGenesis"], "1");
    assert_eq!(json["authClaimMtp"].as_array().unwrap().len(), crate::inputs::CLAIM_LEVELS);
    assert_eq!(json["authClaimNonRevMtpNoAux"], "1");

    let circuit = StateTransitionCircuit::from_marshaled(&bytes, DEPTH).unwrap();
    assert_eq!(circuit.public_inputs()[0], g.id.to_fr());

    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit.generate_constraints(cs.clone()).unwrap();
    assert!(cs.is_satisfied().unwrap());
}

#[test]
fn test_state_transition_full_proof() {
    let mut rng = StdRng::seed_from_u64(42);
    let (pk, vk) =
        Groth16::<Bn254>::circuit_specific_setup(StateTransitionCircuit::empty(DEPTH), &mut rng)
            .unwrap();

    let mut g = genesis(3);
    let inputs = transition_inputs(&mut g);
    let circuit = StateTransitionCircuit::from_inputs(&inputs, DEPTH);
    let public = circuit.public_inputs();

    let proof = Groth16::<Bn254>::prove(&pk, circuit, &mut rng).unwrap();
    assert!(Groth16::<Bn254>::verify(&vk, &public, &proof).unwrap());

    let mut wrong = public.clone();
    wrong[3] = Fr::zero();
    assert!(!Groth16::<Bn254>::verify(&vk, &wrong, &proof).unwrap());
}

#[test]
fn test_challenge_signature_verifies_against_auth_claim_key() {
    let mut g = genesis(4);
    let inputs = transition_inputs(&mut g);
    let public = crate::babyjub::PublicKey::from_coordinates(
        inputs.auth_claim.index_slots()[2],
        inputs.auth_claim.index_slots()[3],
    )
    .unwrap();
    let challenge = poseidon_hash_two(inputs.old_tree_state.state.0, inputs.new_tree_state.state.0);
    assert!(public.verify_poseidon(challenge, &inputs.signature));
}
