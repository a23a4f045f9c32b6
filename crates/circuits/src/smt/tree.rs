//! Sparse Merkle tree native implementation.
//!
//! The tree has a fixed depth. Bit `i` (little-endian) of a key selects the
//! child at level `i` below the root, so a key's leaf slot is its low `depth`
//! bits. Empty subtrees hash to zero (`hash_nodes(0, 0) == 0`) which makes an
//! empty tree's root zero regardless of depth.
//!
//! Nodes are stored content-addressed and never removed, so every root the
//! tree has ever had stays provable.

use std::collections::HashMap;

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use thiserror::Error;

use super::proof::{NodeAux, Proof};
use crate::encoding::fr_to_le_bytes;
use crate::hash::Hash;
use crate::poseidon::{poseidon_hash_many, poseidon_hash_two};

/// Depth of identity claims/revocation/roots trees.
pub const DEFAULT_DEPTH: usize = 40;

/// Largest supported depth (leaf positions must fit in a u64 walk).
pub const MAX_DEPTH: usize = 64;

/// Errors raised by tree mutation and proof generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid tree depth {0}, expected 1..=64")]
    InvalidDepth(usize),
    #[error("Entry already exists for key {0}")]
    EntryExists(String),
    #[error("Key {0} collides with another entry's leaf position")]
    PathCollision(String),
    #[error("Root {0} is not known to this tree")]
    UnknownRoot(String),
    #[error("Tree storage is missing node {0}")]
    MissingNode(String),
    #[error("No entry for key {0}")]
    KeyNotFound(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Middle { left: Fr, right: Fr },
    Leaf { key: Fr, value: Fr },
}

/// Hash a leaf: H(key, value, 1).
pub fn hash_leaf(key: Fr, value: Fr) -> Fr {
    poseidon_hash_many(&[key, value, Fr::one()])
}

/// Hash two children; two empty children give an empty parent.
pub fn hash_nodes(left: Fr, right: Fr) -> Fr {
    if left.is_zero() && right.is_zero() {
        Fr::zero()
    } else {
        poseidon_hash_two(left, right)
    }
}

/// Direction bits of a key from the root downwards (true = right child).
pub fn path_bits(key: &Fr, depth: usize) -> Vec<bool> {
    let bytes = fr_to_le_bytes(key);
    (0..depth)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect()
}

/// Keyed sparse Merkle tree.
#[derive(Clone, Debug)]
pub struct SparseMerkleTree {
    depth: usize,
    root: Fr,
    nodes: HashMap<Fr, Node>,
    entries: usize,
}

impl SparseMerkleTree {
    /// Create an empty tree with the given depth.
    pub fn new(depth: usize) -> Result<Self, TreeError> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::InvalidDepth(depth));
        }
        Ok(Self {
            depth,
            root: Fr::zero(),
            nodes: HashMap::new(),
            entries: 0,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current root hash.
    pub fn root(&self) -> Fr {
        self.root
    }

    /// Number of entries inserted so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Whether `root` is the empty root or a node this tree has produced.
    pub fn knows_root(&self, root: &Fr) -> bool {
        root.is_zero() || matches!(self.nodes.get(root), Some(Node::Middle { .. }))
    }

    fn children(&self, hash: &Fr) -> Result<(Fr, Fr), TreeError> {
        if hash.is_zero() {
            return Ok((Fr::zero(), Fr::zero()));
        }
        match self.nodes.get(hash) {
            Some(Node::Middle { left, right }) => Ok((*left, *right)),
            _ => Err(TreeError::MissingNode(Hash(*hash).to_string())),
        }
    }

    /// Walk from `root` towards `key`'s leaf slot, returning the siblings
    /// (root first) and the hash found in the slot.
    fn walk(&self, root: Fr, bits: &[bool]) -> Result<(Vec<Fr>, Fr), TreeError> {
        let mut siblings = Vec::with_capacity(self.depth);
        let mut current = root;
        for &bit in bits {
            let (left, right) = self.children(&current)?;
            if bit {
                siblings.push(left);
                current = right;
            } else {
                siblings.push(right);
                current = left;
            }
        }
        Ok((siblings, current))
    }

    /// Insert a new entry and return the new root.
    ///
    /// Keys are write-once: re-inserting a key fails with `EntryExists`, and a
    /// different key landing on an occupied slot fails with `PathCollision`.
    pub fn add(&mut self, key: Fr, value: Fr) -> Result<Fr, TreeError> {
        let bits = path_bits(&key, self.depth);
        let (siblings, slot) = self.walk(self.root, &bits)?;

        if !slot.is_zero() {
            return match self.nodes.get(&slot) {
                Some(Node::Leaf { key: existing, .. }) if *existing == key => {
                    Err(TreeError::EntryExists(Hash(key).to_string()))
                }
                _ => Err(TreeError::PathCollision(Hash(key).to_string())),
            };
        }

        self.entries += 1;
        Ok(self.write_leaf(&bits, &siblings, key, value))
    }

    /// Replace the value of an existing entry and return the new root.
    pub fn update(&mut self, key: Fr, value: Fr) -> Result<Fr, TreeError> {
        let bits = path_bits(&key, self.depth);
        let (siblings, slot) = self.walk(self.root, &bits)?;

        match self.nodes.get(&slot) {
            Some(Node::Leaf { key: existing, .. }) if *existing == key => {}
            _ => return Err(TreeError::KeyNotFound(Hash(key).to_string())),
        }

        Ok(self.write_leaf(&bits, &siblings, key, value))
    }

    fn write_leaf(&mut self, bits: &[bool], siblings: &[Fr], key: Fr, value: Fr) -> Fr {
        let mut node = hash_leaf(key, value);
        self.nodes.insert(node, Node::Leaf { key, value });

        for (bit, sibling) in bits.iter().zip(siblings.iter()).rev() {
            let (left, right) = if *bit {
                (*sibling, node)
            } else {
                (node, *sibling)
            };
            node = hash_nodes(left, right);
            self.nodes.insert(node, Node::Middle { left, right });
        }

        self.root = node;
        node
    }

    /// Value stored under `key` at the current root.
    pub fn get(&self, key: Fr) -> Result<Option<Fr>, TreeError> {
        Ok(self.generate_proof(key)?.1)
    }

    /// Proof for `key` against the current root.
    pub fn generate_proof(&self, key: Fr) -> Result<(Proof, Option<Fr>), TreeError> {
        self.generate_proof_at(key, self.root)
    }

    /// Proof for `key` against any root this tree has had.
    ///
    /// Returns the proof and, for an inclusion proof, the stored value.
    pub fn generate_proof_at(&self, key: Fr, root: Fr) -> Result<(Proof, Option<Fr>), TreeError> {
        if !self.knows_root(&root) {
            return Err(TreeError::UnknownRoot(Hash(root).to_string()));
        }

        let bits = path_bits(&key, self.depth);
        let (siblings, slot) = self.walk(root, &bits)?;
        let siblings: Vec<Hash> = siblings.into_iter().map(Hash).collect();

        if slot.is_zero() {
            return Ok((Proof::non_existence(siblings, None), None));
        }

        match self.nodes.get(&slot) {
            Some(Node::Leaf { key: k, value }) if *k == key => {
                Ok((Proof::existence(siblings), Some(*value)))
            }
            Some(Node::Leaf { key: k, value }) => {
                let aux = NodeAux {
                    key: Hash(*k),
                    value: Hash(*value),
                };
                Ok((Proof::non_existence(siblings, Some(aux)), None))
            }
            _ => Err(TreeError::MissingNode(Hash(slot).to_string())),
        }
    }
}

#[cfg(test)]
mod tree_tests {
    use super::*;

    fn key(n: u64) -> Fr {
        Fr::from(n)
    }

    #[test]
    fn test_empty_tree_root_is_zero() {
        let tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        assert!(tree.is_empty());
        assert!(tree.root().is_zero());
        assert_eq!(tree.get(key(5)).unwrap(), None);
    }

    #[test]
    fn test_invalid_depth() {
        assert_eq!(SparseMerkleTree::new(0).unwrap_err(), TreeError::InvalidDepth(0));
        assert_eq!(SparseMerkleTree::new(65).unwrap_err(), TreeError::InvalidDepth(65));
    }

    #[test]
    fn test_insert_changes_root() {
        let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        let root = tree.add(key(1), key(100)).unwrap();
        assert_eq!(root, tree.root());
        assert!(!root.is_zero());
        assert_eq!(tree.get(key(1)).unwrap(), Some(key(100)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        tree.add(key(1), key(100)).unwrap();
        assert!(matches!(tree.add(key(1), key(5)), Err(TreeError::EntryExists(_))));
    }

    #[test]
    fn test_slot_collision_rejected() {
        let mut tree = SparseMerkleTree::new(4).unwrap();
        tree.add(key(1), key(10)).unwrap();
        // 17 shares the low four bits of 1
        assert!(matches!(tree.add(key(17), key(10)), Err(TreeError::PathCollision(_))));
    }

    #[test]
    fn test_order_independence() {
        let mut a = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        let mut b = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        a.add(key(1), key(100)).unwrap();
        a.add(key(42), key(50)).unwrap();
        b.add(key(42), key(50)).unwrap();
        b.add(key(1), key(100)).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_historical_root_stays_provable() {
        let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        let old_root = tree.add(key(1), key(100)).unwrap();
        tree.add(key(2), key(200)).unwrap();

        let (proof, value) = tree.generate_proof_at(key(2), old_root).unwrap();
        assert!(!proof.existence);
        assert_eq!(value, None);
        assert!(proof.verify(old_root, key(2), Fr::zero()));

        let (proof, value) = tree.generate_proof(key(2)).unwrap();
        assert!(proof.existence);
        assert_eq!(value, Some(key(200)));
    }

    #[test]
    fn test_update_keeps_old_value_provable() {
        let mut tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        let before = tree.add(key(3), key(30)).unwrap();
        let after = tree.update(key(3), key(31)).unwrap();
        assert_ne!(before, after);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(key(3)).unwrap(), Some(key(31)));

        let (proof, value) = tree.generate_proof_at(key(3), before).unwrap();
        assert_eq!(value, Some(key(30)));
        assert!(proof.verify(before, key(3), key(30)));

        assert!(matches!(tree.update(key(4), key(1)), Err(TreeError::KeyNotFound(_))));
    }

    #[test]
    fn test_unknown_root_rejected() {
        let tree = SparseMerkleTree::new(DEFAULT_DEPTH).unwrap();
        assert!(matches!(
            tree.generate_proof_at(key(1), key(999)),
            Err(TreeError::UnknownRoot(_))
        ));
    }
}
