//! Field element encodings shared by claims, proofs and circuit inputs.
//!
//! Field elements travel in three shapes: little-endian 32-byte hex (tree
//! hashes and claims), decimal strings (circuit inputs and public signals) and
//! raw little-endian bytes (signing payloads).

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;

use crate::error::CircuitError;
use crate::poseidon::poseidon_hash_many;

/// Bytes packed into a single field element when hashing byte strings.
const BYTES_PER_ELEMENT: usize = 31;

/// Little-endian canonical bytes of a field element (32 bytes for BN254).
pub fn fr_to_le_bytes(f: &Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    let bytes = f.into_bigint().to_bytes_le();
    out[..bytes.len()].copy_from_slice(&bytes);
    out
}

/// Decode little-endian bytes, rejecting values outside the field.
pub fn fr_from_le_bytes(bytes: &[u8]) -> Result<Fr, CircuitError> {
    let n = BigUint::from_bytes_le(bytes);
    biguint_to_field(&n)
}

/// Decimal string of any prime field element.
pub fn field_to_decimal<F: PrimeField>(f: &F) -> String {
    BigUint::from_bytes_le(&f.into_bigint().to_bytes_le()).to_str_radix(10)
}

/// Parse a decimal string into a field element, rejecting non-canonical values.
pub fn field_from_decimal<F: PrimeField>(s: &str) -> Result<F, CircuitError> {
    let n = BigUint::parse_bytes(s.trim().as_bytes(), 10)
        .ok_or_else(|| CircuitError::InvalidField(format!("not a decimal integer: {s:?}")))?;
    biguint_to_field(&n)
}

/// Decimal string of a BN254 scalar.
pub fn fr_to_decimal(f: &Fr) -> String {
    field_to_decimal(f)
}

/// Parse a decimal BN254 scalar.
pub fn fr_from_decimal(s: &str) -> Result<Fr, CircuitError> {
    field_from_decimal(s)
}

fn biguint_to_field<F: PrimeField>(n: &BigUint) -> Result<F, CircuitError> {
    let modulus = BigUint::from_bytes_le(&F::MODULUS.to_bytes_le());
    if n >= &modulus {
        return Err(CircuitError::InvalidField(format!(
            "value {n} exceeds the field modulus"
        )));
    }
    Ok(F::from_le_bytes_mod_order(&n.to_bytes_le()))
}

/// Hash an arbitrary byte string into a field element.
///
/// Bytes are packed little-endian into 31-byte chunks and the byte length is
/// absorbed last, so strings differing only by trailing zero bytes differ.
pub fn hash_bytes(bytes: &[u8]) -> Fr {
    let mut elements: Vec<Fr> = bytes
        .chunks(BYTES_PER_ELEMENT)
        .map(Fr::from_le_bytes_mod_order)
        .collect();
    elements.push(Fr::from(bytes.len() as u64));
    poseidon_hash_many(&elements)
}

/// Hash a UTF-8 string into a field element.
pub fn hash_string(s: &str) -> Fr {
    hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_roundtrip_boundaries() {
        let max = -Fr::from(1u64);
        let s = fr_to_decimal(&max);
        assert_eq!(fr_from_decimal(&s).unwrap(), max);
        assert_eq!(fr_to_decimal(&Fr::from(0u64)), "0");
    }

    #[test]
    fn test_decimal_rejects_modulus() {
        let modulus = BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le()).to_str_radix(10);
        assert!(fr_from_decimal(&modulus).is_err());
        assert!(fr_from_decimal("12ab").is_err());
    }

    #[test]
    fn test_le_bytes_are_canonical() {
        let f = Fr::from(258u64);
        let bytes = fr_to_le_bytes(&f);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 1);
        assert_eq!(fr_from_le_bytes(&bytes).unwrap(), f);
        assert!(fr_from_le_bytes(&[0xff; 32]).is_err());
    }

    #[test]
    fn test_hash_bytes_length_sensitive() {
        assert_ne!(hash_bytes(b"ab"), hash_bytes(b"ab\0"));
        assert_eq!(hash_string("name"), hash_bytes(b"name"));
    }
}
