//! BabyJubJub keys and EdDSA-Poseidon signatures.
//!
//! The curve's base field is the BN254 scalar field, so public key
//! coordinates drop straight into claim slots. Signatures sign a single field
//! element: `s = r + H(R, A, m) * k` over the prime-order subgroup.

use ark_bn254::Fr;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fr as SubgroupScalar};
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::encoding::{field_from_decimal, field_to_decimal, fr_from_decimal, fr_to_decimal};
use crate::error::CircuitError;
use crate::poseidon::poseidon_hash_many;

/// Length of a compressed signature: compressed R followed by `s`.
pub const SIGNATURE_LEN: usize = 64;

/// BabyJubJub private key.
#[derive(Clone)]
pub struct PrivateKey {
    scalar: SubgroupScalar,
    bytes: [u8; 32],
}

/// BabyJubJub public key `A = k * G`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub EdwardsAffine);

/// EdDSA-Poseidon signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r8: EdwardsAffine,
    pub s: SubgroupScalar,
}

fn to_subgroup_scalar(f: &Fr) -> SubgroupScalar {
    SubgroupScalar::from_le_bytes_mod_order(&f.into_bigint().to_bytes_le())
}

impl PrivateKey {
    /// Interpret 32 bytes as a key scalar (reduced mod the subgroup order).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CircuitError> {
        let scalar = SubgroupScalar::from_le_bytes_mod_order(&bytes);
        if scalar.is_zero() {
            return Err(CircuitError::InvalidSignature("zero private key".into()));
        }
        Ok(Self { scalar, bytes })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    pub fn public(&self) -> PublicKey {
        PublicKey((EdwardsAffine::generator() * self.scalar).into_affine())
    }

    /// Sign a field element. Nonces are derived deterministically from the key
    /// and the message.
    pub fn sign_poseidon(&self, msg: Fr) -> Signature {
        let key_fr = Fr::from_le_bytes_mod_order(&self.bytes);
        let r = to_subgroup_scalar(&poseidon_hash_many(&[key_fr, msg]));
        let r8 = (EdwardsAffine::generator() * r).into_affine();
        let a = self.public();
        let h = challenge(&r8, &a, msg);
        Signature {
            r8,
            s: r + h * self.scalar,
        }
    }
}

fn challenge(r8: &EdwardsAffine, a: &PublicKey, msg: Fr) -> SubgroupScalar {
    to_subgroup_scalar(&poseidon_hash_many(&[r8.x, r8.y, a.0.x, a.0.y, msg]))
}

impl PublicKey {
    /// Rebuild a key from its coordinates, checking curve and subgroup membership.
    pub fn from_coordinates(x: Fr, y: Fr) -> Result<Self, CircuitError> {
        let point = EdwardsAffine::new_unchecked(x, y);
        if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
            return Err(CircuitError::InvalidSignature("point is not a valid public key".into()));
        }
        Ok(Self(point))
    }

    /// Parse decimal coordinates, the form auth credentials carry.
    pub fn from_decimal(x: &str, y: &str) -> Result<Self, CircuitError> {
        Self::from_coordinates(fr_from_decimal(x)?, fr_from_decimal(y)?)
    }

    pub fn x(&self) -> Fr {
        self.0.x
    }

    pub fn y(&self) -> Fr {
        self.0.y
    }

    pub fn compress(&self) -> Result<[u8; 32], CircuitError> {
        let mut out = Vec::with_capacity(32);
        self.0
            .serialize_compressed(&mut out)
            .map_err(|e| CircuitError::InvalidSignature(e.to_string()))?;
        out.try_into()
            .map_err(|_| CircuitError::InvalidSignature("unexpected point encoding length".into()))
    }

    pub fn to_hex(&self) -> Result<String, CircuitError> {
        Ok(hex::encode(self.compress()?))
    }

    pub fn verify_poseidon(&self, msg: Fr, sig: &Signature) -> bool {
        let h = challenge(&sig.r8, self, msg);
        let lhs: EdwardsProjective = EdwardsAffine::generator() * sig.s;
        let rhs: EdwardsProjective = sig.r8.into_group() + self.0 * h;
        lhs == rhs
    }
}

impl Signature {
    /// 64-byte encoding: compressed `R8` then `s` little-endian.
    pub fn compress(&self) -> Result<[u8; SIGNATURE_LEN], CircuitError> {
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        self.r8
            .serialize_compressed(&mut out)
            .map_err(|e| CircuitError::InvalidSignature(e.to_string()))?;
        self.s
            .serialize_compressed(&mut out)
            .map_err(|e| CircuitError::InvalidSignature(e.to_string()))?;
        out.try_into()
            .map_err(|_| CircuitError::InvalidSignature("unexpected signature length".into()))
    }

    /// Decode the first 64 bytes of `bytes`.
    pub fn decompress(bytes: &[u8]) -> Result<Self, CircuitError> {
        if bytes.len() < SIGNATURE_LEN {
            return Err(CircuitError::InvalidSignature(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let r8 = EdwardsAffine::deserialize_compressed(&bytes[..32])
            .map_err(|e| CircuitError::InvalidSignature(e.to_string()))?;
        let s = SubgroupScalar::deserialize_compressed(&bytes[32..SIGNATURE_LEN])
            .map_err(|e| CircuitError::InvalidSignature(e.to_string()))?;
        Ok(Self { r8, s })
    }

    pub fn from_hex(s: &str) -> Result<Self, CircuitError> {
        let bytes = hex::decode(s).map_err(|e| CircuitError::InvalidHex(e.to_string()))?;
        Self::decompress(&bytes)
    }

    pub fn to_hex(&self) -> Result<String, CircuitError> {
        Ok(hex::encode(self.compress()?))
    }

    /// `(R8x, R8y, S)` as decimal strings for circuit inputs.
    pub fn marshal(&self) -> (String, String, String) {
        (
            fr_to_decimal(&self.r8.x),
            fr_to_decimal(&self.r8.y),
            field_to_decimal(&self.s),
        )
    }

    /// Inverse of [`Signature::marshal`].
    pub fn from_marshaled(r8x: &str, r8y: &str, s: &str) -> Result<Self, CircuitError> {
        let r8 = EdwardsAffine::new_unchecked(fr_from_decimal(r8x)?, fr_from_decimal(r8y)?);
        if !r8.is_on_curve() {
            return Err(CircuitError::InvalidSignature("R8 is not on the curve".into()));
        }
        Ok(Self {
            r8,
            s: field_from_decimal(s)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes([seed; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let sk = key(7);
        let msg = Fr::from(424242u64);
        let sig = sk.sign_poseidon(msg);
        assert!(sk.public().verify_poseidon(msg, &sig));
        assert!(!sk.public().verify_poseidon(msg + Fr::from(1u64), &sig));
        assert!(!key(8).public().verify_poseidon(msg, &sig));
    }

    #[test]
    fn test_marshaled_signature_parses_back() {
        let sig = key(5).sign_poseidon(Fr::from(77u64));
        let (x, y, s) = sig.marshal();
        assert_eq!(Signature::from_marshaled(&x, &y, &s).unwrap(), sig);
        assert!(Signature::from_marshaled("1", "1", &s).is_err());
    }

    #[test]
    fn test_signature_compression_roundtrip() {
        let sig = key(3).sign_poseidon(Fr::from(9u64));
        let bytes = sig.compress().unwrap();
        assert_eq!(Signature::decompress(&bytes).unwrap(), sig);

        let mut longer = bytes.to_vec();
        longer.extend_from_slice(&[0xaa; 8]);
        assert_eq!(Signature::decompress(&longer).unwrap(), sig);
        assert!(Signature::decompress(&bytes[..63]).is_err());
    }

    #[test]
    fn test_public_key_from_coordinates() {
        let pk = key(5).public();
        let rebuilt = PublicKey::from_decimal(&fr_to_decimal(&pk.x()), &fr_to_decimal(&pk.y())).unwrap();
        assert_eq!(rebuilt, pk);
        assert!(PublicKey::from_coordinates(Fr::from(1u64), Fr::from(2u64)).is_err());
    }

    #[test]
    fn test_zero_key_rejected() {
        assert!(PrivateKey::from_bytes([0u8; 32]).is_err());
    }
}
