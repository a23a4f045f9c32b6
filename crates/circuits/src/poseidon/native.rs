//! Native Poseidon hash functions (outside circuits).

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;

use super::config::poseidon_config;

/// Hash a single field element.
pub fn poseidon_hash(input: Fr) -> Fr {
    poseidon_hash_many(&[input])
}

/// Hash two field elements.
pub fn poseidon_hash_two(a: Fr, b: Fr) -> Fr {
    poseidon_hash_many(&[a, b])
}

/// Hash an ordered list of field elements.
///
/// This is the `Hash(...)` used for identity state, claim hashes and
/// challenges: `state = poseidon_hash_many(&[claims, revocations, roots])`.
pub fn poseidon_hash_many(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(poseidon_config());
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = poseidon_hash_many(&[Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)]);
        let h2 = poseidon_hash_many(&[Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let h1 = poseidon_hash_two(Fr::from(1u64), Fr::from(2u64));
        let h2 = poseidon_hash_two(Fr::from(2u64), Fr::from(1u64));
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_trailing_zero_changes_hash() {
        let h1 = poseidon_hash_many(&[Fr::from(7u64)]);
        let h2 = poseidon_hash_many(&[Fr::from(7u64), Fr::from(0u64)]);
        assert_ne!(h1, h2);
        assert_eq!(poseidon_hash(Fr::from(7u64)), h1);
    }
}
