use std::collections::HashMap;
use std::sync::Arc;

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use identity_circuits::inputs::GIST_LEVELS;
use identity_circuits::poseidon::poseidon_hash;
use identity_circuits::{CircuitId, GistProof, Hash, Id, SparseMerkleTree};
use identity_prover::{Prover, ZkProof};

use super::StateStorage;
use crate::error::{Result, WalletError};

/// Account that pays for and signs state publication.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct LocalSigner {
    address: String,
}

impl LocalSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(format!("0x{}", hex::encode(bytes)))
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Registry bookkeeping for a GIST root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInfo {
    pub root: Hash,
    pub replaced_by_root: Hash,
    pub created_at_timestamp: u64,
    pub replaced_at_timestamp: u64,
    pub created_at_block: u64,
    pub replaced_at_block: u64,
}

/// Registry bookkeeping for one published identity state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateInfo {
    pub id: Id,
    pub state: Hash,
    pub replaced_by_state: Hash,
    pub created_at_timestamp: u64,
    pub replaced_at_timestamp: u64,
    pub created_at_block: u64,
    pub replaced_at_block: u64,
}

struct Registry {
    gist: SparseMerkleTree,
    roots: HashMap<Hash, RootInfo>,
    /// Latest state per GIST key
    latest: HashMap<Hash, StateInfo>,
    history: HashMap<Hash, StateInfo>,
    block: u64,
}

/// In-process stand-in for the on-chain state contract.
///
/// Each publication is one block. With a verifier attached, proofs are
/// checked before the registry changes.
pub struct InMemoryStateStorage {
    registry: RwLock<Registry>,
    verifier: Option<Arc<dyn Prover>>,
}

fn gist_key(id: &Id) -> Fr {
    poseidon_hash(id.to_fr())
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

impl InMemoryStateStorage {
    pub fn new() -> Result<Self> {
        Ok(Self {
            registry: RwLock::new(Registry {
                gist: SparseMerkleTree::new(GIST_LEVELS)?,
                roots: HashMap::new(),
                latest: HashMap::new(),
                history: HashMap::new(),
                block: 0,
            }),
            verifier: None,
        })
    }

    /// Reject publications whose proof does not verify.
    pub fn with_verifier(mut self, verifier: Arc<dyn Prover>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Current GIST root.
    pub async fn gist_root(&self) -> Hash {
        Hash(self.registry.read().await.gist.root())
    }

    /// Bookkeeping for a specific state of an identity.
    pub async fn get_state_info(&self, state: &Hash) -> Option<StateInfo> {
        self.registry.read().await.history.get(state).cloned()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn get_gist_proof(&self, id: &Id) -> Result<GistProof> {
        let registry = self.registry.read().await;
        let (proof, _) = registry.gist.generate_proof(gist_key(id))?;
        Ok(GistProof {
            root: Hash(registry.gist.root()),
            proof,
        })
    }

    async fn get_gist_root_info(&self, root: &Hash) -> Result<RootInfo> {
        Ok(self
            .registry
            .read()
            .await
            .roots
            .get(root)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_latest_state(&self, id: &Id) -> Result<Option<StateInfo>> {
        let key = Hash(gist_key(id));
        Ok(self.registry.read().await.latest.get(&key).cloned())
    }

    async fn publish_state(
        &self,
        proof: &ZkProof,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        let signals = proof.public_inputs()?;
        let [user_id, old_state, new_state, is_genesis] = signals[..] else {
            return Err(WalletError::Validation(format!(
                "state transition expects 4 public signals, got {}",
                signals.len()
            )));
        };
        let id = Id::from_fr(&user_id)?;
        let old_state = Hash(old_state);
        let new_state = Hash(new_state);
        let is_genesis = if is_genesis.is_one() {
            true
        } else if is_genesis.is_zero() {
            false
        } else {
            return Err(WalletError::Validation("isOldStateGenesis must be 0 or 1".into()));
        };

        if let Some(verifier) = &self.verifier {
            if !verifier.verify(proof, CircuitId::StateTransition).await? {
                warn!(id = ?id, "Rejected state transition proof");
                return Err(WalletError::Consistency(
                    "state transition proof does not verify".into(),
                ));
            }
        }

        let mut registry = self.registry.write().await;
        let key = Hash(gist_key(&id));

        match (registry.latest.get(&key), is_genesis) {
            (None, true) => {
                if !id.is_genesis_of(old_state.0) {
                    return Err(WalletError::State(
                        "genesis state does not derive the identifier".into(),
                    ));
                }
            }
            (Some(_), true) => {
                return Err(WalletError::State("identity already has a published state".into()));
            }
            (None, false) => {
                return Err(WalletError::State("identity has no published state".into()));
            }
            (Some(latest), false) => {
                if latest.state != old_state {
                    return Err(WalletError::State(format!(
                        "old state {} is not the latest published state {}",
                        old_state, latest.state
                    )));
                }
            }
        }

        let timestamp = now();
        registry.block += 1;
        let block = registry.block;

        let old_root = Hash(registry.gist.root());
        let new_root = if registry.latest.contains_key(&key) {
            registry.gist.update(key.0, new_state.0)?
        } else {
            registry.gist.add(key.0, new_state.0)?
        };
        let new_root = Hash(new_root);

        if let Some(info) = registry.roots.get_mut(&old_root) {
            info.replaced_by_root = new_root;
            info.replaced_at_timestamp = timestamp;
            info.replaced_at_block = block;
        }
        registry.roots.insert(
            new_root,
            RootInfo {
                root: new_root,
                created_at_timestamp: timestamp,
                created_at_block: block,
                ..RootInfo::default()
            },
        );

        if let Some(previous) = registry.history.get_mut(&old_state) {
            previous.replaced_by_state = new_state;
            previous.replaced_at_timestamp = timestamp;
            previous.replaced_at_block = block;
        }
        let info = StateInfo {
            id,
            state: new_state,
            replaced_by_state: Hash::zero(),
            created_at_timestamp: timestamp,
            replaced_at_timestamp: 0,
            created_at_block: block,
            replaced_at_block: 0,
        };
        registry.history.insert(new_state, info.clone());
        registry.latest.insert(key, info);

        let tx_id = uuid::Uuid::new_v4().to_string();
        info!(
            tx_id = %tx_id,
            from = %signer.address(),
            block,
            gist_root = %new_root,
            "Published identity state"
        );
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_circuits::{DidMethod, DidType, Network};

    fn signals(values: [Fr; 4]) -> ZkProof {
        ZkProof {
            proof: identity_prover::ProofData {
                pi_a: vec![],
                pi_b: vec![],
                pi_c: vec![],
                protocol: "groth16".into(),
                curve: "bn128".into(),
            },
            pub_signals: values
                .iter()
                .map(identity_circuits::encoding::fr_to_decimal)
                .collect(),
        }
    }

    fn did_type() -> DidType {
        DidType::new(DidMethod::Iden3, Network::from_segments("polygon", "mumbai").unwrap())
    }

    #[tokio::test]
    async fn test_publish_replaces_roots() {
        let storage = InMemoryStateStorage::new().unwrap();
        let signer = LocalSigner::random();
        let genesis = Fr::from(1000u64);
        let id = Id::genesis_from_state(did_type(), genesis);

        storage
            .publish_state(&signals([id.to_fr(), genesis, Fr::from(1001u64), Fr::one()]), &signer)
            .await
            .unwrap();
        let first_root = storage.gist_root().await;
        let proof = storage.get_gist_proof(&id).await.unwrap();
        assert_eq!(proof.root, first_root);
        assert!(proof.proof.verify(first_root.0, gist_key(&id), Fr::from(1001u64)));

        storage
            .publish_state(
                &signals([id.to_fr(), Fr::from(1001u64), Fr::from(1002u64), Fr::zero()]),
                &signer,
            )
            .await
            .unwrap();
        let second_root = storage.gist_root().await;

        let first = storage.get_gist_root_info(&first_root).await.unwrap();
        assert_eq!(first.replaced_by_root, second_root);
        assert_ne!(first.replaced_at_timestamp, 0);

        let second = storage.get_gist_root_info(&second_root).await.unwrap();
        assert_eq!(second.root, second_root);
        assert_eq!(second.replaced_at_timestamp, 0);

        let latest = storage.get_latest_state(&id).await.unwrap().unwrap();
        assert_eq!(latest.state, Hash(Fr::from(1002u64)));
        let old = storage.get_state_info(&Hash(Fr::from(1001u64))).await.unwrap();
        assert_eq!(old.replaced_by_state, Hash(Fr::from(1002u64)));
    }

    #[tokio::test]
    async fn test_publish_rejects_stale_old_state() {
        let storage = InMemoryStateStorage::new().unwrap();
        let signer = LocalSigner::new("0x01");
        let genesis = Fr::from(7u64);
        let id = Id::genesis_from_state(did_type(), genesis);

        let err = storage
            .publish_state(&signals([id.to_fr(), Fr::from(8u64), Fr::from(9u64), Fr::one()]), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::State(_)));

        storage
            .publish_state(&signals([id.to_fr(), genesis, Fr::from(9u64), Fr::one()]), &signer)
            .await
            .unwrap();
        let err = storage
            .publish_state(&signals([id.to_fr(), genesis, Fr::from(10u64), Fr::zero()]), &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::State(_)));
    }

    #[tokio::test]
    async fn test_unknown_root_is_zeroed() {
        let storage = InMemoryStateStorage::new().unwrap();
        let info = storage.get_gist_root_info(&Hash(Fr::from(3u64))).await.unwrap();
        assert_eq!(info, RootInfo::default());
    }
}
