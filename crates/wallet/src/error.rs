//! Wallet error taxonomy.

use identity_circuits::{CircuitError, TreeError};
use identity_prover::ProverError;
use thiserror::Error;

/// Broad class of a failure, used by callers to decide how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, unknown operator, unsupported circuit
    Validation,
    /// Data that contradicts itself (claims, tree states)
    Consistency,
    NotFound,
    /// Global state missing or superseded inconsistently
    State,
    Conflict,
    /// Collaborator failure
    Internal,
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Inconsistent data: {0}")]
    Consistency(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("State error: {0}")]
    State(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Key management error: {0}")]
    Kms(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error(transparent)]
    Prover(#[from] ProverError),
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::State(_) => ErrorKind::State,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Circuit(CircuitError::Tree(e)) | Self::Tree(e) => tree_kind(e),
            Self::Circuit(_) => ErrorKind::Validation,
            Self::Prover(ProverError::UnsupportedCircuit(_))
            | Self::Prover(ProverError::InvalidInputs(_))
            | Self::Prover(ProverError::Circuit(_)) => ErrorKind::Validation,
            Self::Prover(ProverError::InvalidSignature) => ErrorKind::Consistency,
            Self::Storage(_)
            | Self::Kms(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Prover(_) => ErrorKind::Internal,
        }
    }
}

fn tree_kind(e: &TreeError) -> ErrorKind {
    match e {
        TreeError::EntryExists(_) | TreeError::PathCollision(_) => ErrorKind::Conflict,
        TreeError::UnknownRoot(_) | TreeError::KeyNotFound(_) => ErrorKind::NotFound,
        TreeError::InvalidDepth(_) | TreeError::MissingNode(_) => ErrorKind::Internal,
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;
    use identity_circuits::CircuitId;

    #[test]
    fn test_error_kinds() {
        assert_eq!(WalletError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            WalletError::from(ProverError::UnsupportedCircuit(CircuitId::AuthV2)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            WalletError::from(TreeError::EntryExists("1".into())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            WalletError::from(CircuitError::InvalidHex("zz".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(WalletError::Storage("disk".into()).kind(), ErrorKind::Internal);
    }
}
