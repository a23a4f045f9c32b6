//! Keyed sparse Merkle tree used for claims, revocations, roots, the global
//! identity state tree and merklized credential documents.
//!
//! This module provides:
//! - Native tree operations (insert, lookup, proofs at current or historical roots)
//! - Inclusion/exclusion proofs with auxiliary-node support
//! - In-circuit inclusion gadgets

mod gadgets;
mod proof;
mod tree;

#[cfg(test)]
mod tests;

pub use gadgets::{compute_root_var, hash_leaf_var, hash_node_var, verify_inclusion, ProofVar};
pub use proof::{NodeAux, Proof};
pub use tree::{hash_leaf, hash_nodes, path_bits, SparseMerkleTree, TreeError, DEFAULT_DEPTH, MAX_DEPTH};
