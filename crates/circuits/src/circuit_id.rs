//! Circuit identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CircuitError;

/// Circuits known to the proof pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitId {
    #[serde(rename = "authV2")]
    AuthV2,
    #[serde(rename = "stateTransition")]
    StateTransition,
    #[serde(rename = "credentialAtomicQueryMTPV2")]
    AtomicQueryMtpV2,
    #[serde(rename = "credentialAtomicQuerySigV2")]
    AtomicQuerySigV2,
}

impl CircuitId {
    pub const ALL: [CircuitId; 4] = [
        CircuitId::AuthV2,
        CircuitId::StateTransition,
        CircuitId::AtomicQueryMtpV2,
        CircuitId::AtomicQuerySigV2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthV2 => "authV2",
            Self::StateTransition => "stateTransition",
            Self::AtomicQueryMtpV2 => "credentialAtomicQueryMTPV2",
            Self::AtomicQuerySigV2 => "credentialAtomicQuerySigV2",
        }
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitId {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| CircuitError::UnknownCircuit(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for id in CircuitId::ALL {
            assert_eq!(id.as_str().parse::<CircuitId>().unwrap(), id);
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
        assert!("credentialAtomicQueryMTP".parse::<CircuitId>().is_err());
    }
}
