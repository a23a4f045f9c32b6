//! Poseidon R1CS gadgets for in-circuit hashing.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use super::config::poseidon_config;

/// Hash two field elements in-circuit.
pub fn poseidon_hash_two_var(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    poseidon_hash_many_var(cs, &[a.clone(), b.clone()])
}

/// Hash an ordered list of field elements in-circuit.
pub fn poseidon_hash_many_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, poseidon_config());
    for input in inputs {
        sponge.absorb(input)?;
    }
    let result = sponge.squeeze_field_elements(1)?;
    Ok(result[0].clone())
}
