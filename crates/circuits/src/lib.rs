//! Identity state primitives and ZK circuits.
//!
//! This crate provides:
//! - `Hash`, `TreeState`, `CoreClaim`, `Id`/`Did`: the identity data model
//! - `SparseMerkleTree`: claims, revocation, roots and global state trees
//! - BabyJubJub keys and EdDSA-Poseidon signatures
//! - `CircuitQuery` and per-circuit input structs with JSON marshaling
//! - `StateTransitionCircuit`: the R1CS state-commitment circuit

pub mod babyjub;
pub mod circuit_id;
pub mod claim;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod id;
pub mod inputs;
pub mod poseidon;
pub mod query;
pub mod smt;
pub mod state_transition;
pub mod tree_state;

#[cfg(test)]
mod tests;

pub use babyjub::{PrivateKey, PublicKey, Signature};
pub use circuit_id::CircuitId;
pub use claim::{CoreClaim, MerklizedRootPosition, SchemaHash, SubjectPosition};
pub use error::CircuitError;
pub use hash::Hash;
pub use id::{Did, DidMethod, DidType, Id, Network};
pub use inputs::{
    AtomicQueryMtpV2Inputs, AtomicQuerySigV2Inputs, AuthV2Inputs, BjjSignatureProof,
    CircuitClaim, GistProof, MerkleTreeProofWithTreeState, StateTransitionInputs,
};
pub use query::{CircuitQuery, Operator, ValueProof, MAX_QUERY_VALUES};
pub use smt::{Proof, SparseMerkleTree, TreeError};
pub use state_transition::StateTransitionCircuit;
pub use tree_state::TreeState;

use ark_bn254::Fr;

/// Common type aliases
pub type ConstraintF = Fr;
