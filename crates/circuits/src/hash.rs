//! `Hash`: a tree node / commitment value with stable text encodings.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{fr_from_decimal, fr_from_le_bytes, fr_to_decimal, fr_to_le_bytes};
use crate::error::CircuitError;

/// A field element used as a Merkle node, root or state commitment.
///
/// Serializes as 64 hex characters of the little-endian bytes; `Display`
/// prints the decimal integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Hash(pub Fr);

impl Hash {
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn fr(&self) -> Fr {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(fr_to_le_bytes(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, CircuitError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CircuitError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CircuitError::InvalidHex(format!(
                "hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(fr_from_le_bytes(&bytes)?))
    }

    pub fn to_decimal(&self) -> String {
        fr_to_decimal(&self.0)
    }

    pub fn from_decimal(s: &str) -> Result<Self, CircuitError> {
        Ok(Self(fr_from_decimal(s)?))
    }
}

impl From<Fr> for Hash {
    fn from(f: Fr) -> Self {
        Self(f)
    }
}

impl From<Hash> for Fr {
    fn from(h: Hash) -> Self {
        h.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl FromStr for Hash {
    type Err = CircuitError;

    /// Parses decimal, the form public signals use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_little_endian() {
        let h = Hash(Fr::from(1u64));
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("01"));
        assert_eq!(Hash::from_hex(&hex).unwrap(), h);
        assert_eq!(Hash::from_hex(&format!("0x{hex}")).unwrap(), h);
    }

    #[test]
    fn test_display_is_decimal() {
        let h = Hash(Fr::from(12345u64));
        assert_eq!(h.to_string(), "12345");
        assert_eq!("12345".parse::<Hash>().unwrap(), h);
    }

    #[test]
    fn test_serde_uses_hex() {
        let h = Hash(Fr::from(7u64));
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        assert!(serde_json::from_str::<Hash>("\"abcd\"").is_err());
    }
}
