//! Identity tree state: the commitment binding the three identity trees.

use serde::{Deserialize, Serialize};

use crate::error::CircuitError;
use crate::hash::Hash;
use crate::poseidon::poseidon_hash_many;

/// `(claims, revocation, roots)` roots and the state they hash to.
///
/// Invariant: `state == Hash(claims_root, revocation_root, root_of_roots)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeState {
    pub state: Hash,
    pub claims_root: Hash,
    pub revocation_root: Hash,
    pub root_of_roots: Hash,
}

impl TreeState {
    /// Build a tree state from roots, computing the state hash.
    pub fn from_roots(claims_root: Hash, revocation_root: Hash, root_of_roots: Hash) -> Self {
        let state = compute_state(&claims_root, &revocation_root, &root_of_roots);
        Self {
            state,
            claims_root,
            revocation_root,
            root_of_roots,
        }
    }

    pub fn is_consistent(&self) -> bool {
        compute_state(&self.claims_root, &self.revocation_root, &self.root_of_roots) == self.state
    }

    /// Reject states whose hash does not open to their roots.
    pub fn validate(&self) -> Result<(), CircuitError> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(CircuitError::InvalidClaim(format!(
                "tree state {} does not hash from its roots",
                self.state
            )))
        }
    }
}

/// `Hash(claims_root, revocation_root, root_of_roots)`.
pub fn compute_state(claims_root: &Hash, revocation_root: &Hash, root_of_roots: &Hash) -> Hash {
    Hash(poseidon_hash_many(&[claims_root.0, revocation_root.0, root_of_roots.0]))
}
