//! Inclusion and exclusion proofs for the keyed sparse Merkle tree.

use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};

use super::tree::{hash_leaf, hash_nodes, path_bits};
use crate::hash::Hash;

/// The leaf occupying a key's slot in an exclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAux {
    pub key: Hash,
    pub value: Hash,
}

/// A Merkle proof for a key.
///
/// `siblings` run from the root level down to the leaf level. An exclusion
/// proof either ends in an empty slot (`node_aux == None`) or in a slot held by
/// another key sharing the same path bits (`node_aux == Some(..)`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub existence: bool,
    pub siblings: Vec<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_aux: Option<NodeAux>,
}

impl Proof {
    pub fn existence(siblings: Vec<Hash>) -> Self {
        Self {
            existence: true,
            siblings,
            node_aux: None,
        }
    }

    pub fn non_existence(siblings: Vec<Hash>, node_aux: Option<NodeAux>) -> Self {
        Self {
            existence: false,
            siblings,
            node_aux,
        }
    }

    /// Number of levels covered by the proof.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold a leaf hash up to the root along `key`'s path.
    pub fn root_from_leaf(&self, key: &Fr, leaf: Fr) -> Fr {
        let bits = path_bits(key, self.depth());
        let mut current = leaf;
        for (bit, sibling) in bits.iter().zip(self.siblings.iter()).rev() {
            current = if *bit {
                hash_nodes(sibling.0, current)
            } else {
                hash_nodes(current, sibling.0)
            };
        }
        current
    }

    /// Root implied by this proof for `(key, value)`.
    ///
    /// `value` is only used by inclusion proofs. Returns `None` when an
    /// exclusion proof's auxiliary node cannot occupy `key`'s slot.
    pub fn compute_root(&self, key: Fr, value: Fr) -> Option<Fr> {
        if self.existence {
            return Some(self.root_from_leaf(&key, hash_leaf(key, value)));
        }
        match &self.node_aux {
            None => Some(self.root_from_leaf(&key, Fr::zero())),
            Some(aux) => {
                if aux.key.0 == key
                    || path_bits(&aux.key.0, self.depth()) != path_bits(&key, self.depth())
                {
                    return None;
                }
                Some(self.root_from_leaf(&key, hash_leaf(aux.key.0, aux.value.0)))
            }
        }
    }

    /// Check the proof against `root`.
    pub fn verify(&self, root: Fr, key: Fr, value: Fr) -> bool {
        self.compute_root(key, value) == Some(root)
    }
}

#[cfg(test)]
mod proof_tests {
    use super::*;

    #[test]
    fn test_empty_exclusion_proof_gives_zero_root() {
        let proof = Proof::non_existence(vec![Hash::zero(); 8], None);
        assert_eq!(proof.compute_root(Fr::from(3u64), Fr::zero()), Some(Fr::zero()));
    }

    #[test]
    fn test_aux_with_same_key_is_invalid() {
        let aux = NodeAux {
            key: Hash(Fr::from(3u64)),
            value: Hash(Fr::from(1u64)),
        };
        let proof = Proof::non_existence(vec![Hash::zero(); 8], Some(aux));
        assert_eq!(proof.compute_root(Fr::from(3u64), Fr::zero()), None);
    }

    #[test]
    fn test_serde_omits_missing_aux() {
        let proof = Proof::existence(vec![Hash::zero(); 2]);
        let json = serde_json::to_value(&proof).unwrap();
        assert!(json.get("node_aux").is_none());
        let back: Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
