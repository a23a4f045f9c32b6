//! Native and in-circuit Poseidon must agree.

use super::*;
use ark_bn254::Fr;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::ConstraintSystem;

#[test]
fn test_hash_two_consistency() {
    let cs = ConstraintSystem::<Fr>::new_ref();

    let a = Fr::from(123u64);
    let b = Fr::from(456u64);
    let native = poseidon_hash_two(a, b);

    let a_var = FpVar::new_witness(cs.clone(), || Ok(a)).unwrap();
    let b_var = FpVar::new_witness(cs.clone(), || Ok(b)).unwrap();
    let result = poseidon_hash_two_var(cs.clone(), &a_var, &b_var).unwrap();
    let expected = FpVar::new_input(cs.clone(), || Ok(native)).unwrap();
    result.enforce_equal(&expected).unwrap();

    assert!(cs.is_satisfied().unwrap());
}

#[test]
fn test_state_hash_consistency() {
    let cs = ConstraintSystem::<Fr>::new_ref();

    let roots = [Fr::from(11u64), Fr::from(0u64), Fr::from(0u64)];
    let native = poseidon_hash_many(&roots);

    let vars: Vec<FpVar<Fr>> = roots
        .iter()
        .map(|r| FpVar::new_witness(cs.clone(), || Ok(*r)).unwrap())
        .collect();
    let result = poseidon_hash_many_var(cs.clone(), &vars).unwrap();
    let expected = FpVar::new_input(cs.clone(), || Ok(native)).unwrap();
    result.enforce_equal(&expected).unwrap();

    assert!(cs.is_satisfied().unwrap());
}

#[test]
fn test_gadget_rejects_wrong_digest() {
    let cs = ConstraintSystem::<Fr>::new_ref();

    let a_var = FpVar::new_witness(cs.clone(), || Ok(Fr::from(1u64))).unwrap();
    let b_var = FpVar::new_witness(cs.clone(), || Ok(Fr::from(2u64))).unwrap();
    let result = poseidon_hash_two_var(cs.clone(), &a_var, &b_var).unwrap();
    let wrong = FpVar::new_input(cs.clone(), || Ok(Fr::from(3u64))).unwrap();
    result.enforce_equal(&wrong).unwrap();

    assert!(!cs.is_satisfied().unwrap());
}
