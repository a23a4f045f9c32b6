//! Identity identifiers and DIDs.
//!
//! An `Id` is 31 bytes: a 2-byte DID type, 27 bytes of genesis material taken
//! from the most significant little-endian bytes of the genesis state, and a
//! 2-byte checksum (sum of the preceding bytes).

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::fr_to_le_bytes;
use crate::error::CircuitError;
use crate::poseidon::poseidon_hash_two;

const ID_LEN: usize = 31;
const GENESIS_LEN: usize = 27;

/// DID method (first byte of the id type).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DidMethod {
    Iden3,
    PolygonId,
}

impl DidMethod {
    fn byte(self) -> u8 {
        match self {
            Self::Iden3 => 0x01,
            Self::PolygonId => 0x02,
        }
    }

    fn from_byte(b: u8) -> Result<Self, CircuitError> {
        match b {
            0x01 => Ok(Self::Iden3),
            0x02 => Ok(Self::PolygonId),
            other => Err(CircuitError::InvalidId(format!("unknown DID method byte {other:#04x}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iden3 => "iden3",
            Self::PolygonId => "polygonid",
        }
    }
}

impl FromStr for DidMethod {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iden3" => Ok(Self::Iden3),
            "polygonid" => Ok(Self::PolygonId),
            other => Err(CircuitError::InvalidId(format!("unknown DID method {other:?}"))),
        }
    }
}

/// Blockchain and network an identity's state is published to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    ReadOnly,
    PolygonMain,
    PolygonMumbai,
    EthereumMain,
    EthereumGoerli,
}

impl Network {
    fn byte(self) -> u8 {
        match self {
            Self::ReadOnly => 0x00,
            Self::PolygonMain => 0x11,
            Self::PolygonMumbai => 0x12,
            Self::EthereumMain => 0x21,
            Self::EthereumGoerli => 0x22,
        }
    }

    fn from_byte(b: u8) -> Result<Self, CircuitError> {
        match b {
            0x00 => Ok(Self::ReadOnly),
            0x11 => Ok(Self::PolygonMain),
            0x12 => Ok(Self::PolygonMumbai),
            0x21 => Ok(Self::EthereumMain),
            0x22 => Ok(Self::EthereumGoerli),
            other => Err(CircuitError::InvalidId(format!("unknown network byte {other:#04x}"))),
        }
    }

    /// `(blockchain, network)` path segments, empty for read-only ids.
    fn segments(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::ReadOnly => None,
            Self::PolygonMain => Some(("polygon", "main")),
            Self::PolygonMumbai => Some(("polygon", "mumbai")),
            Self::EthereumMain => Some(("eth", "main")),
            Self::EthereumGoerli => Some(("eth", "goerli")),
        }
    }

    pub fn from_segments(blockchain: &str, network: &str) -> Result<Self, CircuitError> {
        match (blockchain, network) {
            ("polygon", "main") => Ok(Self::PolygonMain),
            ("polygon", "mumbai") => Ok(Self::PolygonMumbai),
            ("eth", "main") => Ok(Self::EthereumMain),
            ("eth", "goerli") => Ok(Self::EthereumGoerli),
            (b, n) => Err(CircuitError::InvalidId(format!("unsupported network {b}:{n}"))),
        }
    }
}

/// Two-byte id type: method and network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DidType(pub [u8; 2]);

impl DidType {
    pub const IDEN3_POLYGON_MUMBAI: DidType = DidType([0x01, 0x12]);

    pub fn new(method: DidMethod, network: Network) -> Self {
        Self([method.byte(), network.byte()])
    }

    pub fn method(&self) -> Result<DidMethod, CircuitError> {
        DidMethod::from_byte(self.0[0])
    }

    pub fn network(&self) -> Result<Network, CircuitError> {
        Network::from_byte(self.0[1])
    }
}

/// 31-byte identity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id([u8; ID_LEN]);

impl Id {
    /// Derive a genesis id from an identity state.
    pub fn genesis_from_state(did_type: DidType, state: Fr) -> Self {
        let state_bytes = fr_to_le_bytes(&state);
        let mut bytes = [0u8; ID_LEN];
        bytes[..2].copy_from_slice(&did_type.0);
        bytes[2..2 + GENESIS_LEN].copy_from_slice(&state_bytes[32 - GENESIS_LEN..]);
        let checksum = checksum(&bytes[..ID_LEN - 2]);
        bytes[ID_LEN - 2..].copy_from_slice(&checksum.to_le_bytes());
        Self(bytes)
    }

    /// Profile identifier derived from this id and a nonce.
    pub fn profile_id(&self, nonce: Fr) -> Self {
        let hash = poseidon_hash_two(self.to_fr(), nonce);
        Self::genesis_from_state(self.did_type(), hash)
    }

    /// Whether this id is the genesis id of `state`.
    pub fn is_genesis_of(&self, state: Fr) -> bool {
        Self::genesis_from_state(self.did_type(), state) == *self
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CircuitError> {
        let arr: [u8; ID_LEN] = bytes
            .try_into()
            .map_err(|_| CircuitError::InvalidId(format!("id must be 31 bytes, got {}", bytes.len())))?;
        let expected = checksum(&arr[..ID_LEN - 2]);
        let actual = u16::from_le_bytes([arr[ID_LEN - 2], arr[ID_LEN - 1]]);
        if expected != actual {
            return Err(CircuitError::InvalidId("checksum mismatch".into()));
        }
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn did_type(&self) -> DidType {
        DidType([self.0[0], self.0[1]])
    }

    /// Integer form used inside circuits and trees.
    pub fn to_fr(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }

    pub fn from_fr(f: &Fr) -> Result<Self, CircuitError> {
        let bytes = fr_to_le_bytes(f);
        if bytes[ID_LEN] != 0 {
            return Err(CircuitError::InvalidId("value does not fit in 31 bytes".into()));
        }
        Self::from_bytes(&bytes[..ID_LEN])
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, CircuitError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CircuitError::InvalidId(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_base58())
    }
}

/// Decentralized identifier wrapping an `Id`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Did {
    id: Id,
}

impl Did {
    /// Wrap an id, checking its type bytes are known.
    pub fn from_id(id: Id) -> Result<Self, CircuitError> {
        id.did_type().method()?;
        id.did_type().network()?;
        Ok(Self { id })
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn method(&self) -> DidMethod {
        self.id.did_type().method().unwrap_or(DidMethod::Iden3)
    }

    pub fn network(&self) -> Network {
        self.id.did_type().network().unwrap_or(Network::ReadOnly)
    }

    pub fn parse(s: &str) -> Result<Self, CircuitError> {
        let parts: Vec<&str> = s.split(':').collect();
        let (method, network, encoded) = match parts.as_slice() {
            ["did", method, encoded] => (method.parse::<DidMethod>()?, Network::ReadOnly, *encoded),
            ["did", method, chain, net, encoded] => (
                method.parse::<DidMethod>()?,
                Network::from_segments(chain, net)?,
                *encoded,
            ),
            _ => return Err(CircuitError::InvalidId(format!("malformed DID {s:?}"))),
        };
        let id = Id::from_base58(encoded)?;
        if id.did_type() != DidType::new(method, network) {
            return Err(CircuitError::InvalidId(format!(
                "DID {s:?} does not match its id type"
            )));
        }
        Ok(Self { id })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network().segments() {
            Some((chain, net)) => write!(
                f,
                "did:{}:{}:{}:{}",
                self.method().as_str(),
                chain,
                net,
                self.id.to_base58()
            ),
            None => write!(f, "did:{}:{}", self.method().as_str(), self.id.to_base58()),
        }
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({self})")
    }
}

impl FromStr for Did {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Did::parse(&s).map_err(de::Error::custom)
    }
}
