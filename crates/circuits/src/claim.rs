//! Core claim: the fixed 8-slot encoding inserted into a claims tree.
//!
//! Layout of the first index slot (`i_0`, little-endian bytes):
//!
//! ```text
//! [0..16)  schema hash
//! [16]     flags: bits 0-2 subject position, bit 3 expiration,
//!          bit 4 updatable, bits 5-7 merklized root position
//! [20..24) version (u32)
//! ```
//!
//! `v_0` holds the revocation nonce in bytes `[0..8)` and the expiration
//! timestamp in bytes `[8..16)`. Slots are numbered 0..=3 for the index and
//! 4..=7 for the value.

use std::fmt;

use ark_bn254::Fr;
use ark_ff::{PrimeField, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{fr_from_le_bytes, fr_to_decimal, fr_to_le_bytes};
use crate::error::CircuitError;
use crate::id::Id;
use crate::poseidon::{poseidon_hash_many, poseidon_hash_two};

const FLAGS_BYTE: usize = 16;
const VERSION_OFFSET: usize = 20;

const SUBJECT_MASK: u8 = 0b0000_0111;
const SUBJECT_SELF: u8 = 0b000;
const SUBJECT_INDEX: u8 = 0b010;
const SUBJECT_VALUE: u8 = 0b011;
const EXPIRATION_FLAG: u8 = 0b0000_1000;
const UPDATABLE_FLAG: u8 = 0b0001_0000;
const MERKLIZED_MASK: u8 = 0b1110_0000;
const MERKLIZED_INDEX: u8 = 0b0010_0000;
const MERKLIZED_VALUE: u8 = 0b0100_0000;

/// Slot holding a merklized root stored in the index.
pub const MERKLIZED_INDEX_SLOT: usize = 2;
/// Slot holding a merklized root stored in the value.
pub const MERKLIZED_VALUE_SLOT: usize = 5;

/// 16-byte schema identifier carried in `i_0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SchemaHash(pub [u8; 16]);

impl SchemaHash {
    /// Schema of the BabyJubJub authentication claim.
    pub const AUTH_BJJ: SchemaHash = SchemaHash([
        0xca, 0x93, 0x88, 0x57, 0x24, 0x1d, 0xb9, 0x45, 0x1e, 0xa3, 0x29, 0x25, 0x6b, 0x9c, 0x06,
        0xe5,
    ]);

    pub fn from_hex(s: &str) -> Result<Self, CircuitError> {
        let bytes = hex::decode(s).map_err(|e| CircuitError::InvalidHex(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CircuitError::InvalidHex("schema hash must be 16 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Schema hash as a field element, the form circuits consume.
    pub fn to_fr(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }
}

/// Where the claim's subject identifier lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubjectPosition {
    /// The claim is about its issuer.
    SelfSubject,
    Index,
    Value,
}

/// Where a merklized credential root lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MerklizedRootPosition {
    #[default]
    None,
    Index,
    Value,
}

impl MerklizedRootPosition {
    /// Flattened slot index holding the root, if any.
    pub fn slot_index(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Index => Some(MERKLIZED_INDEX_SLOT),
            Self::Value => Some(MERKLIZED_VALUE_SLOT),
        }
    }
}

/// Eight-slot claim encoding: four index slots and four value slots.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreClaim {
    index: [Fr; 4],
    value: [Fr; 4],
}

impl CoreClaim {
    /// A claim of the given schema with every other slot zeroed.
    pub fn new(schema: SchemaHash) -> Self {
        let mut claim = Self::default();
        claim.set_schema_hash(schema);
        claim
    }

    fn header(&self) -> [u8; 32] {
        fr_to_le_bytes(&self.index[0])
    }

    fn set_header(&mut self, bytes: [u8; 32]) {
        self.index[0] = Fr::from_le_bytes_mod_order(&bytes);
    }

    fn flags(&self) -> u8 {
        self.header()[FLAGS_BYTE]
    }

    fn set_flags(&mut self, flags: u8) {
        let mut header = self.header();
        header[FLAGS_BYTE] = flags;
        self.set_header(header);
    }

    pub fn schema_hash(&self) -> SchemaHash {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.header()[..16]);
        SchemaHash(out)
    }

    pub fn set_schema_hash(&mut self, schema: SchemaHash) {
        let mut header = self.header();
        header[..16].copy_from_slice(&schema.0);
        self.set_header(header);
    }

    pub fn version(&self) -> u32 {
        let header = self.header();
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&header[VERSION_OFFSET..VERSION_OFFSET + 4]);
        u32::from_le_bytes(bytes)
    }

    pub fn set_version(&mut self, version: u32) {
        let mut header = self.header();
        header[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&version.to_le_bytes());
        self.set_header(header);
    }

    pub fn is_updatable(&self) -> bool {
        self.flags() & UPDATABLE_FLAG != 0
    }

    pub fn set_updatable(&mut self, updatable: bool) {
        let flags = self.flags() & !UPDATABLE_FLAG;
        self.set_flags(if updatable { flags | UPDATABLE_FLAG } else { flags });
    }

    pub fn subject_position(&self) -> Result<SubjectPosition, CircuitError> {
        match self.flags() & SUBJECT_MASK {
            SUBJECT_SELF => Ok(SubjectPosition::SelfSubject),
            SUBJECT_INDEX => Ok(SubjectPosition::Index),
            SUBJECT_VALUE => Ok(SubjectPosition::Value),
            other => Err(CircuitError::InvalidClaim(format!(
                "invalid subject position flag {other:#05b}"
            ))),
        }
    }

    /// Subject identifier, `None` for self-claims.
    pub fn id(&self) -> Result<Option<Id>, CircuitError> {
        match self.subject_position()? {
            SubjectPosition::SelfSubject => Ok(None),
            SubjectPosition::Index => Id::from_fr(&self.index[1]).map(Some),
            SubjectPosition::Value => Id::from_fr(&self.value[1]).map(Some),
        }
    }

    pub fn set_index_id(&mut self, id: &Id) -> Result<(), CircuitError> {
        self.reset_id();
        self.index[1] = id.to_fr();
        self.set_flags((self.flags() & !SUBJECT_MASK) | SUBJECT_INDEX);
        Ok(())
    }

    /// Store the subject in `v_1`; incompatible with a root in the value.
    pub fn set_value_id(&mut self, id: &Id) -> Result<(), CircuitError> {
        if self.merklized_root_position()? == MerklizedRootPosition::Value {
            return Err(CircuitError::InvalidClaim(
                "subject id and merklized root cannot both live in the value".into(),
            ));
        }
        self.reset_id();
        self.value[1] = id.to_fr();
        self.set_flags((self.flags() & !SUBJECT_MASK) | SUBJECT_VALUE);
        Ok(())
    }

    fn reset_id(&mut self) {
        match self.flags() & SUBJECT_MASK {
            SUBJECT_INDEX => self.index[1] = Fr::zero(),
            SUBJECT_VALUE => self.value[1] = Fr::zero(),
            _ => {}
        }
        self.set_flags(self.flags() & !SUBJECT_MASK);
    }

    pub fn merklized_root_position(&self) -> Result<MerklizedRootPosition, CircuitError> {
        match self.flags() & MERKLIZED_MASK {
            0 => Ok(MerklizedRootPosition::None),
            MERKLIZED_INDEX => Ok(MerklizedRootPosition::Index),
            MERKLIZED_VALUE => Ok(MerklizedRootPosition::Value),
            other => Err(CircuitError::InvalidClaim(format!(
                "invalid merklized flag {other:#010b}"
            ))),
        }
    }

    pub fn set_index_merklized_root(&mut self, root: Fr) -> Result<(), CircuitError> {
        self.reset_merklized_root()?;
        self.index[MERKLIZED_INDEX_SLOT] = root;
        self.set_flags((self.flags() & !MERKLIZED_MASK) | MERKLIZED_INDEX);
        Ok(())
    }

    pub fn set_value_merklized_root(&mut self, root: Fr) -> Result<(), CircuitError> {
        if self.subject_position()? == SubjectPosition::Value {
            return Err(CircuitError::InvalidClaim(
                "subject id and merklized root cannot both live in the value".into(),
            ));
        }
        self.reset_merklized_root()?;
        self.value[MERKLIZED_VALUE_SLOT - 4] = root;
        self.set_flags((self.flags() & !MERKLIZED_MASK) | MERKLIZED_VALUE);
        Ok(())
    }

    fn reset_merklized_root(&mut self) -> Result<(), CircuitError> {
        match self.merklized_root_position()? {
            MerklizedRootPosition::Index => self.index[MERKLIZED_INDEX_SLOT] = Fr::zero(),
            MerklizedRootPosition::Value => self.value[MERKLIZED_VALUE_SLOT - 4] = Fr::zero(),
            MerklizedRootPosition::None => {}
        }
        self.set_flags(self.flags() & !MERKLIZED_MASK);
        Ok(())
    }

    /// Merklized root, if the claim carries one.
    pub fn merklized_root(&self) -> Result<Option<Fr>, CircuitError> {
        Ok(match self.merklized_root_position()? {
            MerklizedRootPosition::None => None,
            MerklizedRootPosition::Index => Some(self.index[MERKLIZED_INDEX_SLOT]),
            MerklizedRootPosition::Value => Some(self.value[MERKLIZED_VALUE_SLOT - 4]),
        })
    }

    /// Set index data slots `i_2` and `i_3`.
    pub fn set_index_data_slots(&mut self, a: Fr, b: Fr) {
        self.index[2] = a;
        self.index[3] = b;
    }

    /// Set value data slots `v_2` and `v_3`.
    pub fn set_value_data_slots(&mut self, a: Fr, b: Fr) {
        self.value[2] = a;
        self.value[3] = b;
    }

    /// Write one flattened slot (2, 3, 6 or 7) used for schema data.
    pub fn set_data_slot(&mut self, slot: usize, value: Fr) -> Result<(), CircuitError> {
        match slot {
            2 | 3 => self.index[slot] = value,
            6 | 7 => self.value[slot - 4] = value,
            other => {
                return Err(CircuitError::InvalidClaim(format!(
                    "slot {other} is not a data slot"
                )))
            }
        }
        Ok(())
    }

    fn value_header(&self) -> [u8; 32] {
        fr_to_le_bytes(&self.value[0])
    }

    fn set_value_header(&mut self, bytes: [u8; 32]) {
        self.value[0] = Fr::from_le_bytes_mod_order(&bytes);
    }

    pub fn revocation_nonce(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.value_header()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn set_revocation_nonce(&mut self, nonce: u64) {
        let mut header = self.value_header();
        header[..8].copy_from_slice(&nonce.to_le_bytes());
        self.set_value_header(header);
    }

    /// Expiration as unix seconds, if set.
    pub fn expiration(&self) -> Option<u64> {
        if self.flags() & EXPIRATION_FLAG == 0 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.value_header()[8..16]);
        Some(u64::from_le_bytes(bytes))
    }

    pub fn set_expiration(&mut self, unix_seconds: Option<u64>) {
        let mut header = self.value_header();
        header[8..16].copy_from_slice(&unix_seconds.unwrap_or(0).to_le_bytes());
        self.set_value_header(header);
        let flags = self.flags() & !EXPIRATION_FLAG;
        self.set_flags(if unix_seconds.is_some() {
            flags | EXPIRATION_FLAG
        } else {
            flags
        });
    }

    pub fn index_slots(&self) -> &[Fr; 4] {
        &self.index
    }

    pub fn value_slots(&self) -> &[Fr; 4] {
        &self.value
    }

    /// All eight slots, index first.
    pub fn slots(&self) -> [Fr; 8] {
        let mut out = [Fr::zero(); 8];
        out[..4].copy_from_slice(&self.index);
        out[4..].copy_from_slice(&self.value);
        out
    }

    /// Slots as decimal strings, the shape circuit inputs take.
    pub fn marshal_slots(&self) -> Vec<String> {
        self.slots().iter().map(fr_to_decimal).collect()
    }

    /// Key of the claim in a claims tree.
    pub fn h_index(&self) -> Fr {
        poseidon_hash_many(&self.index)
    }

    /// Value of the claim in a claims tree.
    pub fn h_value(&self) -> Fr {
        poseidon_hash_many(&self.value)
    }

    /// `Hash(hIndex, hValue)`, the message an issuer signs.
    pub fn hash(&self) -> Fr {
        poseidon_hash_two(self.h_index(), self.h_value())
    }

    pub fn to_hex(&self) -> String {
        self.slots()
            .iter()
            .map(|f| hex::encode(fr_to_le_bytes(f)))
            .collect()
    }

    pub fn from_hex(s: &str) -> Result<Self, CircuitError> {
        let bytes = hex::decode(s).map_err(|e| CircuitError::InvalidHex(e.to_string()))?;
        if bytes.len() != 8 * 32 {
            return Err(CircuitError::InvalidClaim(format!(
                "core claim must be 256 bytes, got {}",
                bytes.len()
            )));
        }
        let mut claim = Self::default();
        for (i, chunk) in bytes.chunks(32).enumerate() {
            let f = fr_from_le_bytes(chunk)?;
            if i < 4 {
                claim.index[i] = f;
            } else {
                claim.value[i - 4] = f;
            }
        }
        claim.subject_position()?;
        claim.merklized_root_position()?;
        Ok(claim)
    }
}

impl fmt::Debug for CoreClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CoreClaim").field(&self.to_hex()).finish()
    }
}

impl Serialize for CoreClaim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CoreClaim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CoreClaim::from_hex(&s).map_err(de::Error::custom)
    }
}
