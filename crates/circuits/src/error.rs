//! Error types for identity primitives and circuit inputs.

use thiserror::Error;

use crate::smt::TreeError;

/// Errors raised while building or encoding identity primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    #[error("Invalid field element: {0}")]
    InvalidField(String),
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),
    #[error("Invalid key or signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Unknown circuit id: {0}")]
    UnknownCircuit(String),
    #[error("Input marshaling failed: {0}")]
    Marshal(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
