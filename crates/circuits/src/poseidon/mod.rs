//! Poseidon hash over the BN254 scalar field.
//!
//! Every commitment in the identity model (claim index/value hashes, tree
//! nodes, identity state, challenges) goes through this one sponge so that
//! native values and in-circuit values agree.

mod config;
mod gadgets;
mod native;

#[cfg(test)]
mod tests;

pub use config::poseidon_config;
pub use gadgets::{poseidon_hash_many_var, poseidon_hash_two_var};
pub use native::{poseidon_hash, poseidon_hash_many, poseidon_hash_two};
