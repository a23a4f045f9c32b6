//! In-circuit inclusion checks for the keyed sparse Merkle tree.

use ark_bn254::Fr;
use ark_r1cs_std::{boolean::Boolean, fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use super::proof::Proof;
use crate::poseidon::{poseidon_hash_many_var, poseidon_hash_two_var};

/// Circuit variable representation of a proof's siblings.
#[derive(Clone)]
pub struct ProofVar {
    /// Sibling hashes, root level first
    siblings: Vec<FpVar<Fr>>,
}

impl ProofVar {
    /// Allocate the first `depth` siblings of a proof as witnesses.
    ///
    /// Proofs padded beyond `depth` must carry zeros in the padding.
    pub fn new_witness(
        cs: ConstraintSystemRef<Fr>,
        proof: &Proof,
        depth: usize,
    ) -> Result<Self, SynthesisError> {
        if proof.siblings.len() < depth || proof.siblings[depth..].iter().any(|s| !s.is_zero()) {
            return Err(SynthesisError::Unsatisfiable);
        }
        let siblings = proof.siblings[..depth]
            .iter()
            .map(|h| FpVar::new_witness(cs.clone(), || Ok(h.0)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { siblings })
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// H(left, right) in-circuit, with two empty children hashing to zero.
pub fn hash_node_var(
    cs: ConstraintSystemRef<Fr>,
    left: &FpVar<Fr>,
    right: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let both_empty = left.is_zero()?.and(&right.is_zero()?)?;
    let hashed = poseidon_hash_two_var(cs, left, right)?;
    both_empty.select(&FpVar::zero(), &hashed)
}

/// H(key, value, 1) in-circuit.
pub fn hash_leaf_var(
    cs: ConstraintSystemRef<Fr>,
    key: &FpVar<Fr>,
    value: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_many_var(cs, &[key.clone(), value.clone(), FpVar::one()])
}

/// Fold a leaf up to the root along the path selected by `key`'s low bits.
pub fn compute_root_var(
    cs: ConstraintSystemRef<Fr>,
    key: &FpVar<Fr>,
    leaf: &FpVar<Fr>,
    proof: &ProofVar,
) -> Result<FpVar<Fr>, SynthesisError> {
    let bits: Vec<Boolean<Fr>> = key.to_bits_le()?;
    let mut current = leaf.clone();

    for (level, sibling) in proof.siblings.iter().enumerate().rev() {
        let is_right = &bits[level];
        let left = is_right.select(sibling, &current)?;
        let right = is_right.select(&current, sibling)?;
        current = hash_node_var(cs.clone(), &left, &right)?;
    }

    Ok(current)
}

/// Enforce that `(key, value)` is a leaf of the tree with root `root`.
pub fn verify_inclusion(
    cs: ConstraintSystemRef<Fr>,
    root: &FpVar<Fr>,
    key: &FpVar<Fr>,
    value: &FpVar<Fr>,
    proof: &ProofVar,
) -> Result<(), SynthesisError> {
    let leaf = hash_leaf_var(cs.clone(), key, value)?;
    let computed = compute_root_var(cs, key, &leaf, proof)?;
    computed.enforce_equal(root)
}
