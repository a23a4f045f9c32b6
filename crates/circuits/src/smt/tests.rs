//! Tree, proof and gadget agreement tests.

use super::*;
use ark_bn254::Fr;
use ark_ff::Zero;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::ConstraintSystem;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use ark_std::UniformRand;

#[test]
fn test_inclusion_proofs_verify_for_every_entry() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
    let entries: Vec<(Fr, Fr)> = (0..16).map(|_| (Fr::rand(&mut rng), Fr::rand(&mut rng))).collect();
    for (k, v) in &entries {
        tree.add(*k, *v).unwrap();
    }

    for (k, v) in &entries {
        let (proof, value) = tree.generate_proof(*k).unwrap();
        assert!(proof.existence);
        assert_eq!(value, Some(*v));
        assert_eq!(proof.depth(), DEFAULT_DEPTH);
        assert!(proof.verify(tree.root(), *k, *v));
        assert!(!proof.verify(tree.root(), *k, *v + Fr::from(1u64)));
    }
}

#[test]
fn test_exclusion_proof_with_aux_node() {
    let mut tree = SparseMerkleTree::new(4).unwrap();
    tree.add(Fr::from(1u64), Fr::from(10u64)).unwrap();
    tree.add(Fr::from(2u64), Fr::from(20u64)).unwrap();

    let (proof, value) = tree.generate_proof(Fr::from(17u64)).unwrap();
    assert!(!proof.existence);
    assert!(value.is_none());
    let aux = proof.node_aux.clone().unwrap();
    assert_eq!(aux.key.0, Fr::from(1u64));
    assert!(proof.verify(tree.root(), Fr::from(17u64), Fr::zero()));
}

#[test]
fn test_exclusion_proof_of_empty_slot() {
    let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
    tree.add(Fr::from(1u64), Fr::from(10u64)).unwrap();

    let (proof, _) = tree.generate_proof(Fr::from(6u64)).unwrap();
    assert!(!proof.existence);
    assert!(proof.node_aux.is_none());
    assert!(proof.verify(tree.root(), Fr::from(6u64), Fr::zero()));
}

#[test]
fn test_gadget_accepts_native_proof() {
    let mut tree = SparseMerkleTree::new(8).unwrap();
    tree.add(Fr::from(5u64), Fr::from(50u64)).unwrap();
    tree.add(Fr::from(9u64), Fr::from(90u64)).unwrap();
    let (proof, _) = tree.generate_proof(Fr::from(9u64)).unwrap();

    let cs = ConstraintSystem::<Fr>::new_ref();
    let root = FpVar::new_input(cs.clone(), || Ok(tree.root())).unwrap();
    let key = FpVar::new_witness(cs.clone(), || Ok(Fr::from(9u64))).unwrap();
    let value = FpVar::new_witness(cs.clone(), || Ok(Fr::from(90u64))).unwrap();
    let proof_var = ProofVar::new_witness(cs.clone(), &proof, 8).unwrap();

    verify_inclusion(cs.clone(), &root, &key, &value, &proof_var).unwrap();
    assert!(cs.is_satisfied().unwrap());
}

#[test]
fn test_gadget_rejects_wrong_value() {
    let mut tree = SparseMerkleTree::new(8).unwrap();
    tree.add(Fr::from(5u64), Fr::from(50u64)).unwrap();
    let (proof, _) = tree.generate_proof(Fr::from(5u64)).unwrap();

    let cs = ConstraintSystem::<Fr>::new_ref();
    let root = FpVar::new_input(cs.clone(), || Ok(tree.root())).unwrap();
    let key = FpVar::new_witness(cs.clone(), || Ok(Fr::from(5u64))).unwrap();
    let value = FpVar::new_witness(cs.clone(), || Ok(Fr::from(51u64))).unwrap();
    let proof_var = ProofVar::new_witness(cs.clone(), &proof, 8).unwrap();

    verify_inclusion(cs.clone(), &root, &key, &value, &proof_var).unwrap();
    assert!(!cs.is_satisfied().unwrap());
}
