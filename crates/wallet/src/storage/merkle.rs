use std::collections::HashMap;

use ark_bn254::Fr;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use identity_circuits::{Hash, Proof, SparseMerkleTree, TreeState};

use super::MerkleTreeStorage;
use crate::error::{Result, WalletError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MerkleTreeType {
    Claims,
    Revocations,
    Roots,
}

#[derive(Clone)]
struct TreeSet {
    claims: SparseMerkleTree,
    revocations: SparseMerkleTree,
    roots: SparseMerkleTree,
}

impl TreeSet {
    fn new(depth: usize) -> Result<Self> {
        Ok(Self {
            claims: SparseMerkleTree::new(depth)?,
            revocations: SparseMerkleTree::new(depth)?,
            roots: SparseMerkleTree::new(depth)?,
        })
    }

    fn tree(&self, tree: MerkleTreeType) -> &SparseMerkleTree {
        match tree {
            MerkleTreeType::Claims => &self.claims,
            MerkleTreeType::Revocations => &self.revocations,
            MerkleTreeType::Roots => &self.roots,
        }
    }

    fn tree_mut(&mut self, tree: MerkleTreeType) -> &mut SparseMerkleTree {
        match tree {
            MerkleTreeType::Claims => &mut self.claims,
            MerkleTreeType::Revocations => &mut self.revocations,
            MerkleTreeType::Roots => &mut self.roots,
        }
    }

    fn tree_state(&self) -> TreeState {
        TreeState::from_roots(
            Hash(self.claims.root()),
            Hash(self.revocations.root()),
            Hash(self.roots.root()),
        )
    }
}

pub struct InMemoryMerkleTreeStorage {
    depth: usize,
    trees: RwLock<HashMap<String, TreeSet>>,
}

impl InMemoryMerkleTreeStorage {
    pub fn new(depth: usize) -> Result<Self> {
        // Fail on a bad depth here rather than on first identity creation
        SparseMerkleTree::new(depth)?;
        Ok(Self {
            depth,
            trees: RwLock::new(HashMap::new()),
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of tree sets held, temporary ones included.
    pub async fn len(&self) -> usize {
        self.trees.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn unknown(identifier: &str) -> WalletError {
    WalletError::NotFound(format!("no merkle trees for identifier {identifier}"))
}

#[async_trait]
impl MerkleTreeStorage for InMemoryMerkleTreeStorage {
    async fn create_identity_merkle_trees(&self, identifier: &str) -> Result<()> {
        let mut trees = self.trees.write().await;
        if trees.contains_key(identifier) {
            return Err(WalletError::Conflict(format!(
                "merkle trees already exist for {identifier}"
            )));
        }
        trees.insert(identifier.to_string(), TreeSet::new(self.depth)?);
        Ok(())
    }

    async fn bind_merkle_trees_to_new_identifier(&self, old: &str, new: &str) -> Result<()> {
        let mut trees = self.trees.write().await;
        if trees.contains_key(new) {
            return Err(WalletError::Conflict(format!("merkle trees already exist for {new}")));
        }
        let set = trees.remove(old).ok_or_else(|| unknown(old))?;
        trees.insert(new.to_string(), set);
        debug!(from = old, to = new, "Rebound merkle trees");
        Ok(())
    }

    async fn add_entry(
        &self,
        identifier: &str,
        tree: MerkleTreeType,
        key: Fr,
        value: Fr,
    ) -> Result<()> {
        let mut trees = self.trees.write().await;
        let set = trees.get_mut(identifier).ok_or_else(|| unknown(identifier))?;
        set.tree_mut(tree).add(key, value)?;
        Ok(())
    }

    async fn add_entries(
        &self,
        identifier: &str,
        entries: &[(MerkleTreeType, Fr, Fr)],
    ) -> Result<()> {
        let mut trees = self.trees.write().await;
        let set = trees.get_mut(identifier).ok_or_else(|| unknown(identifier))?;
        let mut staged = set.clone();
        for (tree, key, value) in entries {
            staged.tree_mut(*tree).add(*key, *value)?;
        }
        *set = staged;
        Ok(())
    }

    async fn remove_identity_merkle_trees(&self, identifier: &str) -> Result<()> {
        let mut trees = self.trees.write().await;
        trees.remove(identifier).ok_or_else(|| unknown(identifier))?;
        debug!(identifier, "Removed merkle trees");
        Ok(())
    }

    async fn get_merkle_tree(
        &self,
        identifier: &str,
        tree: MerkleTreeType,
    ) -> Result<SparseMerkleTree> {
        let trees = self.trees.read().await;
        let set = trees.get(identifier).ok_or_else(|| unknown(identifier))?;
        Ok(set.tree(tree).clone())
    }

    async fn snapshot(&self, identifier: &str) -> Result<TreeState> {
        let trees = self.trees.read().await;
        let set = trees.get(identifier).ok_or_else(|| unknown(identifier))?;
        Ok(set.tree_state())
    }

    async fn generate_proof(
        &self,
        identifier: &str,
        tree: MerkleTreeType,
        key: Fr,
        root: Hash,
    ) -> Result<Proof> {
        let trees = self.trees.read().await;
        let set = trees.get(identifier).ok_or_else(|| unknown(identifier))?;
        let (proof, _) = set.tree(tree).generate_proof_at(key, root.0)?;
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Zero;

    #[tokio::test]
    async fn test_rebind_moves_trees() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("tmp").await.unwrap();
        storage
            .add_entry("tmp", MerkleTreeType::Claims, Fr::from(1u64), Fr::from(2u64))
            .await
            .unwrap();
        let before = storage.snapshot("tmp").await.unwrap();

        storage.bind_merkle_trees_to_new_identifier("tmp", "did:x").await.unwrap();
        assert_eq!(storage.snapshot("did:x").await.unwrap(), before);
        assert!(matches!(
            storage.snapshot("tmp").await,
            Err(WalletError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_consistent() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("a").await.unwrap();
        storage
            .add_entry("a", MerkleTreeType::Revocations, Fr::from(7u64), Fr::zero())
            .await
            .unwrap();
        let state = storage.snapshot("a").await.unwrap();
        assert!(state.is_consistent());
        assert!(state.claims_root.is_zero());
        assert!(!state.revocation_root.is_zero());
    }

    #[tokio::test]
    async fn test_proof_at_captured_root() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("a").await.unwrap();
        let empty = storage.snapshot("a").await.unwrap();
        storage
            .add_entry("a", MerkleTreeType::Claims, Fr::from(5u64), Fr::from(6u64))
            .await
            .unwrap();

        let proof = storage
            .generate_proof("a", MerkleTreeType::Claims, Fr::from(5u64), empty.claims_root)
            .await
            .unwrap();
        assert!(!proof.existence);

        let current = storage.snapshot("a").await.unwrap();
        let proof = storage
            .generate_proof("a", MerkleTreeType::Claims, Fr::from(5u64), current.claims_root)
            .await
            .unwrap();
        assert!(proof.verify(current.claims_root.0, Fr::from(5u64), Fr::from(6u64)));
    }

    #[tokio::test]
    async fn test_duplicate_creation_conflicts() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("a").await.unwrap();
        assert!(matches!(
            storage.create_identity_merkle_trees("a").await,
            Err(WalletError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("a").await.unwrap();
        storage
            .add_entry("a", MerkleTreeType::Claims, Fr::from(3u64), Fr::from(4u64))
            .await
            .unwrap();
        let before = storage.snapshot("a").await.unwrap();

        let err = storage
            .add_entries(
                "a",
                &[
                    (MerkleTreeType::Claims, Fr::from(1u64), Fr::from(2u64)),
                    (MerkleTreeType::Claims, Fr::from(3u64), Fr::from(9u64)),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
        assert_eq!(storage.snapshot("a").await.unwrap(), before);

        storage
            .add_entries(
                "a",
                &[
                    (MerkleTreeType::Claims, Fr::from(1u64), Fr::from(2u64)),
                    (MerkleTreeType::Roots, Fr::from(8u64), Fr::zero()),
                ],
            )
            .await
            .unwrap();
        let after = storage.snapshot("a").await.unwrap();
        assert_ne!(after.claims_root, before.claims_root);
        assert!(!after.root_of_roots.is_zero());
    }

    #[tokio::test]
    async fn test_remove_trees() {
        let storage = InMemoryMerkleTreeStorage::new(16).unwrap();
        storage.create_identity_merkle_trees("a").await.unwrap();
        assert_eq!(storage.len().await, 1);

        storage.remove_identity_merkle_trees("a").await.unwrap();
        assert!(storage.is_empty().await);
        assert!(matches!(
            storage.remove_identity_merkle_trees("a").await,
            Err(WalletError::NotFound(_))
        ));
        // The identifier is free again
        storage.create_identity_merkle_trees("a").await.unwrap();
    }
}
