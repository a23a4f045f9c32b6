//! Storage collaborators and their in-memory implementations.

mod credential;
mod identity;
mod merkle;
mod state;

pub use credential::InMemoryCredentialStorage;
pub use identity::{Identity, IdentityStatus, InMemoryIdentityStorage, Profile};
pub use merkle::{InMemoryMerkleTreeStorage, MerkleTreeType};
pub use state::{InMemoryStateStorage, LocalSigner, RootInfo, StateInfo, TransactionSigner};

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;

use identity_circuits::{GistProof, Hash, Id, Proof, SparseMerkleTree, TreeState};
use identity_prover::ZkProof;

use crate::credential::W3CCredential;
use crate::error::Result;

/// Per-identity claims, revocation and roots trees.
#[async_trait]
pub trait MerkleTreeStorage: Send + Sync {
    async fn create_identity_merkle_trees(&self, identifier: &str) -> Result<()>;

    /// Move the tree set of `old` to `new`.
    async fn bind_merkle_trees_to_new_identifier(&self, old: &str, new: &str) -> Result<()>;

    async fn add_entry(
        &self,
        identifier: &str,
        tree: MerkleTreeType,
        key: Fr,
        value: Fr,
    ) -> Result<()>;

    /// Insert every entry or none of them.
    async fn add_entries(&self, identifier: &str, entries: &[(MerkleTreeType, Fr, Fr)])
        -> Result<()>;

    /// Drop the tree set of `identifier`.
    async fn remove_identity_merkle_trees(&self, identifier: &str) -> Result<()>;

    /// Copy of one tree.
    async fn get_merkle_tree(&self, identifier: &str, tree: MerkleTreeType)
        -> Result<SparseMerkleTree>;

    /// The three roots read together, as a tree state.
    async fn snapshot(&self, identifier: &str) -> Result<TreeState>;

    /// Proof for `key` against `root`, which may be any root the tree has had.
    async fn generate_proof(
        &self,
        identifier: &str,
        tree: MerkleTreeType,
        key: Fr,
        root: Hash,
    ) -> Result<Proof>;
}

#[async_trait]
pub trait IdentityStorage: Send + Sync {
    async fn save_identity(&self, identity: Identity) -> Result<()>;
    async fn get_identity(&self, identifier: &str) -> Result<Option<Identity>>;
    async fn save_profile(&self, profile: Profile) -> Result<()>;
    async fn get_profiles_by_genesis_identifier(&self, genesis: &str) -> Result<Vec<Profile>>;
}

#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Insert or replace by credential id.
    async fn save_credential(&self, credential: W3CCredential) -> Result<()>;
    async fn get_credential(&self, id: &str) -> Result<Option<W3CCredential>>;
    async fn list_credentials(&self) -> Result<Vec<W3CCredential>>;
}

/// On-chain identity state registry and global identity state tree.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Proof of the identity's entry in the current GIST.
    async fn get_gist_proof(&self, id: &Id) -> Result<GistProof>;

    /// Bookkeeping for a GIST root. Unknown roots come back zeroed.
    async fn get_gist_root_info(&self, root: &Hash) -> Result<RootInfo>;

    /// Latest published state of an identity.
    async fn get_latest_state(&self, id: &Id) -> Result<Option<StateInfo>>;

    /// Publish a state transition proof, returning the transaction id.
    async fn publish_state(&self, proof: &ZkProof, signer: &dyn TransactionSigner)
        -> Result<String>;
}

/// The storages an identity wallet works over.
#[derive(Clone)]
pub struct DataStorage {
    pub merkle_trees: Arc<dyn MerkleTreeStorage>,
    pub identities: Arc<dyn IdentityStorage>,
    pub credentials: Arc<dyn CredentialStorage>,
    pub states: Arc<dyn StateStorage>,
}

impl DataStorage {
    /// In-memory storages, identity trees of `tree_depth`.
    pub fn in_memory(tree_depth: usize) -> Result<Self> {
        Ok(Self {
            merkle_trees: Arc::new(InMemoryMerkleTreeStorage::new(tree_depth)?),
            identities: Arc::new(InMemoryIdentityStorage::new()),
            credentials: Arc::new(InMemoryCredentialStorage::new()),
            states: Arc::new(InMemoryStateStorage::new()?),
        })
    }
}
