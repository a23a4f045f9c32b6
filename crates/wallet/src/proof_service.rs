//! Proof orchestration: circuit inputs from credentials and queries, auth
//! inputs, global state verification and identity state transitions.

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use identity_circuits::encoding::fr_from_le_bytes;
use identity_circuits::poseidon::poseidon_hash_two;
use identity_circuits::{
    AtomicQueryMtpV2Inputs, AtomicQuerySigV2Inputs, AuthV2Inputs, BjjSignatureProof,
    CircuitClaim, CircuitId, Did, Hash, MerkleTreeProofWithTreeState, StateTransitionInputs,
    TreeState,
};
use identity_prover::{Prover, ZkProof};

use crate::credential::{ProofEvidence, W3CCredential};
use crate::credential_wallet::CredentialWallet;
use crate::error::{Result, WalletError};
use crate::identity::IdentityWallet;
use crate::protocol::{ZeroKnowledgeProofRequest, ZeroKnowledgeProofResponse};
use crate::query::QueryTranslator;
use crate::storage::{StateStorage, TransactionSigner};

/// Index of the GIST root among AuthV2 public signals.
const AUTH_V2_GIST_ROOT_SIGNAL: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProofGenerationOptions {
    pub auth_profile_nonce: u64,
    pub credential_subject_profile_nonce: u64,
    pub skip_revocation: bool,
}

/// Prepares AuthV2 inputs for a message hash, as a ZKP packer needs them.
#[async_trait]
pub trait AuthDataPreparer: Send + Sync {
    async fn prepare_auth_data(
        &self,
        hash: &[u8],
        did: &Did,
        profile_nonce: u64,
        circuit_id: CircuitId,
    ) -> Result<Vec<u8>>;
}

/// Checks the global state a proof's public signals commit to.
#[async_trait]
pub trait StateVerifier: Send + Sync {
    async fn verify_public_state(&self, circuit_id: CircuitId, pub_signals: &[String])
        -> Result<bool>;
}

pub struct ProofService {
    identity_wallet: Arc<IdentityWallet>,
    credential_wallet: Arc<dyn CredentialWallet>,
    prover: Arc<dyn Prover>,
    state_storage: Arc<dyn StateStorage>,
    translator: QueryTranslator,
}

impl ProofService {
    pub fn new(
        identity_wallet: Arc<IdentityWallet>,
        credential_wallet: Arc<dyn CredentialWallet>,
        prover: Arc<dyn Prover>,
        state_storage: Arc<dyn StateStorage>,
        translator: QueryTranslator,
    ) -> Self {
        Self {
            identity_wallet,
            credential_wallet,
            prover,
            state_storage,
            translator,
        }
    }

    /// Answer a proof request with `credential`, proving as `identifier`.
    pub async fn generate_proof(
        &self,
        request: &ZeroKnowledgeProofRequest,
        identifier: &Did,
        credential: &W3CCredential,
        options: ProofGenerationOptions,
    ) -> Result<ZeroKnowledgeProofResponse> {
        let circuit_id = request.circuit()?;
        if !matches!(
            circuit_id,
            CircuitId::AtomicQueryMtpV2 | CircuitId::AtomicQuerySigV2
        ) {
            return Err(WalletError::Validation(format!(
                "circuit {circuit_id} cannot answer a credential query"
            )));
        }
        info!(circuit = %circuit_id, request_id = request.id, did = %identifier, "Generating query proof");

        let (credential, revocation) = self
            .credential_wallet
            .find_non_revoked_credential(std::slice::from_ref(credential))
            .await?;
        let evidence = credential.evidence()?;
        let core_claim = evidence.core_claim()?;

        let non_rev_proof = MerkleTreeProofWithTreeState {
            proof: revocation.mtp,
            tree_state: revocation.issuer,
        };
        let claim = match circuit_id {
            CircuitId::AtomicQueryMtpV2 => CircuitClaim {
                issuer_id: *credential.issuer.id(),
                claim: core_claim,
                inc_proof: Some(inclusion_proof(&evidence)?),
                non_rev_proof,
                signature_proof: None,
            },
            _ => CircuitClaim {
                issuer_id: *credential.issuer.id(),
                claim: core_claim,
                inc_proof: None,
                non_rev_proof,
                signature_proof: Some(self.signature_proof(&evidence).await?),
            },
        };

        let (query, vp) = self
            .translator
            .to_circuits_query(&request.query, &credential, &core_claim)
            .await?;

        let skip_claim_revocation_check = options.skip_revocation
            || request.query.skip_claim_revocation_check.unwrap_or(false);
        let request_id = Fr::from(request.id);
        let id = *identifier.id();
        let profile_nonce = Fr::from(options.auth_profile_nonce);
        let claim_subject_profile_nonce = Fr::from(options.credential_subject_profile_nonce);
        let current_timestamp = Utc::now().timestamp();

        let inputs = match circuit_id {
            CircuitId::AtomicQueryMtpV2 => AtomicQueryMtpV2Inputs {
                request_id,
                id,
                profile_nonce,
                claim_subject_profile_nonce,
                claim,
                skip_claim_revocation_check,
                query,
                current_timestamp,
            }
            .inputs_marshal()?,
            _ => AtomicQuerySigV2Inputs {
                request_id,
                id,
                profile_nonce,
                claim_subject_profile_nonce,
                claim,
                skip_claim_revocation_check,
                query,
                current_timestamp,
            }
            .inputs_marshal()?,
        };

        let proof = self.prover.generate(&inputs, circuit_id).await?;
        debug!(request_id = request.id, signals = proof.pub_signals.len(), "Query proof generated");
        Ok(ZeroKnowledgeProofResponse {
            id: request.id,
            circuit_id,
            proof,
            vp,
        })
    }

    async fn signature_proof(&self, evidence: &ProofEvidence<'_>) -> Result<BjjSignatureProof> {
        let proof = evidence.signature().ok_or_else(|| {
            WalletError::NotFound("credential has no BJJSignature2021 proof".into())
        })?;
        let issuer = &proof.issuer_data;
        let issuer_auth_claim = issuer.auth_core_claim.ok_or_else(|| {
            WalletError::Consistency("issuer data has no auth core claim".into())
        })?;
        let auth_mtp = issuer.mtp.clone().ok_or_else(|| {
            WalletError::Consistency("issuer data has no auth claim proof".into())
        })?;
        let auth_status = issuer.credential_status.as_ref().ok_or_else(|| {
            WalletError::Consistency("issuer data has no auth claim status".into())
        })?;

        let auth_revocation = self
            .credential_wallet
            .get_revocation_status(auth_status, &issuer.id)
            .await?;
        Ok(BjjSignatureProof {
            signature: proof.signature()?,
            issuer_auth_claim,
            issuer_auth_inc_proof: MerkleTreeProofWithTreeState {
                proof: auth_mtp,
                tree_state: issuer.state.tree_state()?,
            },
            issuer_auth_non_rev_proof: MerkleTreeProofWithTreeState {
                proof: auth_revocation.mtp,
                tree_state: auth_revocation.issuer,
            },
        })
    }

    /// Marshaled AuthV2 inputs proving control of `did` over `hash`.
    pub async fn generate_auth_v2_inputs(
        &self,
        hash: &[u8],
        did: &Did,
        profile_nonce: u64,
        circuit_id: CircuitId,
    ) -> Result<Vec<u8>> {
        if circuit_id != CircuitId::AuthV2 {
            return Err(WalletError::Validation(format!(
                "auth inputs cannot be prepared for circuit {circuit_id}"
            )));
        }
        if hash.len() > 32 {
            return Err(WalletError::Validation(format!(
                "challenge hash must be at most 32 bytes, got {}",
                hash.len()
            )));
        }
        let mut le = hash.to_vec();
        le.reverse();
        let challenge = fr_from_le_bytes(&le).map_err(|_| {
            WalletError::Validation(format!(
                "challenge hash {} is not a field element",
                hex::encode(hash)
            ))
        })?;

        let auth = self.credential_wallet.get_auth_bjj_credential(did).await?;
        let tree_state = self.identity_wallet.get_did_tree_state(did).await?;
        let (inclusion, non_revocation) = self
            .identity_wallet
            .generate_claim_proofs(did, &auth, Some(tree_state))
            .await?;
        let gist_proof = self.state_storage.get_gist_proof(did.id()).await?;
        let signature = self.identity_wallet.sign_challenge(challenge, &auth).await?;

        let inputs = AuthV2Inputs {
            genesis_id: *did.id(),
            profile_nonce: Fr::from(profile_nonce),
            auth_claim: auth.core_claim()?,
            auth_claim_inc_mtp: inclusion.proof,
            auth_claim_non_rev_mtp: non_revocation.proof,
            tree_state,
            gist_proof,
            signature,
            challenge,
        };
        debug!(did = %did, "Prepared AuthV2 inputs");
        Ok(inputs.inputs_marshal()?)
    }

    /// Whether the GIST root an AuthV2 proof commits to is current.
    ///
    /// A superseded root yields `false`; roots the registry never saw, or
    /// whose bookkeeping is inconsistent, are errors.
    pub async fn verify_state(&self, circuit_id: CircuitId, pub_signals: &[String]) -> Result<bool> {
        if circuit_id != CircuitId::AuthV2 {
            return Err(WalletError::Validation(format!(
                "state verification is not supported for circuit {circuit_id}"
            )));
        }
        let signal = pub_signals.get(AUTH_V2_GIST_ROOT_SIGNAL).ok_or_else(|| {
            WalletError::Validation(format!(
                "expected at least {} public signals, got {}",
                AUTH_V2_GIST_ROOT_SIGNAL + 1,
                pub_signals.len()
            ))
        })?;
        let root = Hash::from_decimal(signal)?;

        let info = self.state_storage.get_gist_root_info(&root).await?;
        if info.created_at_timestamp == 0 {
            return Err(WalletError::State(format!("gist root {root} is not known")));
        }
        if info.root != root {
            return Err(WalletError::State(format!(
                "gist root {} does not match requested root {root}",
                info.root
            )));
        }
        if !info.replaced_by_root.is_zero() {
            if info.replaced_at_timestamp == 0 {
                return Err(WalletError::State(format!(
                    "gist root {root} is replaced without a replacement time"
                )));
            }
            warn!(root = %root, replaced_by = %info.replaced_by_root, "Gist root is superseded");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn verify_proof(&self, proof: &ZkProof, circuit_id: CircuitId) -> Result<bool> {
        Ok(self.prover.verify(proof, circuit_id).await?)
    }

    /// Prove and publish the move of `did` from `old_tree_state` to its
    /// current trees. Returns the transaction id.
    pub async fn transit_state(
        &self,
        did: &Did,
        old_tree_state: &TreeState,
        is_old_state_genesis: bool,
        state_storage: &dyn StateStorage,
        signer: &dyn TransactionSigner,
    ) -> Result<String> {
        let _guard = self.identity_wallet.lock(did).await;
        if !old_tree_state.is_consistent() {
            return Err(WalletError::Consistency(format!(
                "old tree state {} does not hash from its roots",
                old_tree_state.state
            )));
        }

        let auth = self.credential_wallet.get_auth_bjj_credential(did).await?;
        let auth_claim = auth.core_claim()?;
        let (inclusion, non_revocation) = self
            .identity_wallet
            .generate_claim_proofs(did, &auth, Some(*old_tree_state))
            .await?;

        let new_tree_state = self.identity_wallet.get_did_tree_state(did).await?;
        if new_tree_state.state == old_tree_state.state {
            return Err(WalletError::Validation(format!(
                "state of {did} has not changed since {}",
                old_tree_state.state
            )));
        }

        let challenge = poseidon_hash_two(old_tree_state.state.0, new_tree_state.state.0);
        let signature = self.identity_wallet.sign_challenge(challenge, &auth).await?;
        let new_state_inclusion = self
            .identity_wallet
            .generate_claim_mtp(did, &auth, Some(new_tree_state))
            .await?;

        let inputs = StateTransitionInputs {
            id: *did.id(),
            old_tree_state: *old_tree_state,
            new_tree_state,
            is_old_state_genesis,
            auth_claim,
            auth_claim_inc_mtp: inclusion.proof,
            auth_claim_non_rev_mtp: non_revocation.proof,
            auth_claim_new_state_inc_mtp: new_state_inclusion.proof,
            signature,
        };
        let proof = self
            .prover
            .generate(&inputs.inputs_marshal()?, CircuitId::StateTransition)
            .await?;

        let tx_id = state_storage.publish_state(&proof, signer).await?;
        self.identity_wallet
            .record_transition(did, new_tree_state.state, &tx_id)
            .await?;
        info!(
            did = %did,
            tx_id = %tx_id,
            old_state = %old_tree_state.state,
            new_state = %new_tree_state.state,
            "Published state transition"
        );
        Ok(tx_id)
    }

    pub async fn finalize_state_transition(&self, did: &Did, tx_id: &str, confirmed: bool) -> Result<()> {
        self.identity_wallet
            .finalize_transition(did, tx_id, confirmed)
            .await
    }
}

fn inclusion_proof(evidence: &ProofEvidence<'_>) -> Result<MerkleTreeProofWithTreeState> {
    let proof = evidence.inclusion().ok_or_else(|| {
        WalletError::NotFound("credential has no Iden3SparseMerkleTreeProof".into())
    })?;
    Ok(MerkleTreeProofWithTreeState {
        proof: proof.mtp.clone(),
        tree_state: proof.issuer_data.state.tree_state()?,
    })
}

#[async_trait]
impl AuthDataPreparer for ProofService {
    async fn prepare_auth_data(
        &self,
        hash: &[u8],
        did: &Did,
        profile_nonce: u64,
        circuit_id: CircuitId,
    ) -> Result<Vec<u8>> {
        self.generate_auth_v2_inputs(hash, did, profile_nonce, circuit_id)
            .await
    }
}

#[async_trait]
impl StateVerifier for ProofService {
    async fn verify_public_state(
        &self,
        circuit_id: CircuitId,
        pub_signals: &[String],
    ) -> Result<bool> {
        self.verify_state(circuit_id, pub_signals).await
    }
}
