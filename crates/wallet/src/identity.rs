//! Identity wallet: identities, profiles, claims and their Merkle proofs.

use std::sync::Arc;

use ark_bn254::Fr;
use ark_ff::Zero;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use identity_circuits::encoding::{fr_to_decimal, fr_to_le_bytes};
use identity_circuits::{
    CoreClaim, Did, DidType, Hash, MerkleTreeProofWithTreeState, SchemaHash, Signature, TreeState,
};

use crate::config::WalletConfig;
use crate::credential::{
    BjjSignature2021Proof, CredentialProof, CredentialRequest, CredentialSchema, CredentialStatus,
    CredentialStatusType, Iden3SparseMerkleTreeProof, IssuerData, IssuerState, MerklizedPlacement,
    SubjectPlacement, W3CCredential, AUTH_BJJ_CREDENTIAL_TYPE, AUTH_BJJ_SCHEMA_URL,
    IDEN3_PROOFS_CONTEXT, JSON_SCHEMA_TYPE, VERIFIABLE_CREDENTIAL_TYPE, W3C_CREDENTIALS_CONTEXT,
};
use crate::error::{Result, WalletError};
use crate::kms::{key_path, KeyId, KeyType, Kms};
use crate::locks::IdentityLocks;
use crate::merklize::{MerklizedDocument, MtValue};
use crate::schema::{context_url, schema_hash, serialization_slots, SchemaLoader};
use crate::storage::{DataStorage, Identity, IdentityStatus, MerkleTreeType, Profile};

pub struct IdentityWallet {
    kms: Arc<Kms>,
    storage: DataStorage,
    schemas: Arc<dyn SchemaLoader>,
    did_type: DidType,
    base_url: String,
    locks: IdentityLocks,
}

impl IdentityWallet {
    pub fn new(
        kms: Arc<Kms>,
        storage: DataStorage,
        schemas: Arc<dyn SchemaLoader>,
        config: &WalletConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kms,
            storage,
            schemas,
            did_type: config.did_type()?,
            base_url: config.base_url(),
            locks: IdentityLocks::new(),
        })
    }

    pub fn storage(&self) -> &DataStorage {
        &self.storage
    }

    /// Exclusive writer lock on one identity's trees and record.
    pub async fn lock(&self, did: &Did) -> OwnedMutexGuard<()> {
        self.locks.lock(&did.to_string()).await
    }

    /// Create a genesis identity whose auth key is derived from `seed`.
    ///
    /// Returns the DID and its self-issued auth credential. The trees are
    /// built under a temporary identifier and only bound to the DID once the
    /// credential is ready; on any failure the tree set is dropped and
    /// nothing is persisted.
    pub async fn create_identity(&self, seed: &[u8]) -> Result<(Did, W3CCredential)> {
        let tmp_identifier = uuid::Uuid::new_v4().to_string();
        let trees = &self.storage.merkle_trees;
        trees.create_identity_merkle_trees(&tmp_identifier).await?;

        let (did, credential, state) = match self.build_genesis(&tmp_identifier, seed).await {
            Ok(genesis) => genesis,
            Err(e) => {
                self.discard_trees(&tmp_identifier).await;
                return Err(e);
            }
        };

        let identifier = did.to_string();
        if let Err(e) = trees
            .bind_merkle_trees_to_new_identifier(&tmp_identifier, &identifier)
            .await
        {
            self.discard_trees(&tmp_identifier).await;
            return Err(e);
        }

        // Identity record last
        let saved = async {
            self.storage.credentials.save_credential(credential.clone()).await?;
            self.storage
                .identities
                .save_identity(Identity::genesis(identifier.clone(), state))
                .await
        };
        if let Err(e) = saved.await {
            self.discard_trees(&identifier).await;
            return Err(e);
        }

        info!(did = %identifier, "Created identity");
        Ok((did, credential))
    }

    /// Auth claim, DID and auth credential for a fresh tree set.
    async fn build_genesis(
        &self,
        tmp_identifier: &str,
        seed: &[u8],
    ) -> Result<(Did, W3CCredential, Hash)> {
        let trees = &self.storage.merkle_trees;
        let key = self.kms.create_key_from_seed(KeyType::BabyJubJub, seed).await?;
        let public = self.kms.public_key(&key).await?;

        let revocation_nonce = 0;
        let mut auth_claim = CoreClaim::new(SchemaHash::AUTH_BJJ);
        auth_claim.set_index_data_slots(public.x(), public.y());
        auth_claim.set_revocation_nonce(revocation_nonce);

        trees
            .add_entry(
                tmp_identifier,
                MerkleTreeType::Claims,
                auth_claim.h_index(),
                auth_claim.h_value(),
            )
            .await?;

        let tree_state = trees.snapshot(tmp_identifier).await?;
        let id = identity_circuits::Id::genesis_from_state(self.did_type, tree_state.state.0);
        let did = Did::from_id(id)?;

        let mut subject = Map::new();
        subject.insert("x".into(), Value::String(fr_to_decimal(&public.x())));
        subject.insert("y".into(), Value::String(fr_to_decimal(&public.y())));
        subject.insert("type".into(), Value::String(AUTH_BJJ_CREDENTIAL_TYPE.into()));

        let request = CredentialRequest {
            credential_schema: AUTH_BJJ_SCHEMA_URL.into(),
            credential_type: AUTH_BJJ_CREDENTIAL_TYPE.into(),
            credential_subject: subject,
            expiration: None,
            rev_nonce: Some(revocation_nonce),
            version: 0,
            subject_position: SubjectPlacement::Index,
            merklized_root_position: MerklizedPlacement::None,
        };
        let schema = self.schemas.load(AUTH_BJJ_SCHEMA_URL).await?;
        let mut credential =
            self.build_credential(&did, &request, context_url(&schema)?, revocation_nonce);

        let mtp = trees
            .generate_proof(
                tmp_identifier,
                MerkleTreeType::Claims,
                auth_claim.h_index(),
                tree_state.claims_root,
            )
            .await?;
        credential.attach_proof(CredentialProof::Iden3SparseMerkleTree(
            Iden3SparseMerkleTreeProof {
                issuer_data: IssuerData {
                    id: did,
                    state: IssuerState::from_tree_state(&tree_state),
                    auth_core_claim: Some(auth_claim),
                    mtp: None,
                    credential_status: Some(credential.credential_status.clone()),
                },
                core_claim: auth_claim,
                mtp,
            },
        ));
        debug!(did = %did, key = %key.id, "Built genesis auth credential");
        Ok((did, credential, tree_state.state))
    }

    async fn discard_trees(&self, identifier: &str) {
        if let Err(e) = self
            .storage
            .merkle_trees
            .remove_identity_merkle_trees(identifier)
            .await
        {
            warn!(identifier, error = %e, "Failed to drop merkle trees");
        }
    }

    /// Derive the profile of `did` for `nonce`. The nonce and the verifier
    /// must both be new for this identity.
    pub async fn create_profile(&self, did: &Did, nonce: u64, verifier: &str) -> Result<Did> {
        let _guard = self.lock(did).await;
        let genesis = did.to_string();
        self.get_identity(did).await?;

        let profiles = self
            .storage
            .identities
            .get_profiles_by_genesis_identifier(&genesis)
            .await?;
        if profiles.iter().any(|p| p.nonce == nonce || p.verifier == verifier) {
            return Err(WalletError::Conflict(
                "profile with given nonce or verifier already exists".into(),
            ));
        }

        let profile = Did::from_id(did.id().profile_id(Fr::from(nonce)))?;
        self.storage
            .identities
            .save_profile(Profile {
                id: profile.to_string(),
                nonce,
                genesis_identifier: genesis,
                verifier: verifier.to_string(),
            })
            .await?;
        info!(did = %did, profile = %profile, nonce, "Created profile");
        Ok(profile)
    }

    pub async fn generate_key(&self, key_type: KeyType) -> Result<KeyId> {
        self.kms.generate_key(key_type).await
    }

    pub async fn get_identity(&self, did: &Did) -> Result<Identity> {
        self.storage
            .identities
            .get_identity(&did.to_string())
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("identity {did}")))
    }

    /// Live tree state of `did`, read atomically.
    pub async fn get_did_tree_state(&self, did: &Did) -> Result<TreeState> {
        self.storage.merkle_trees.snapshot(&did.to_string()).await
    }

    async fn resolve_state(&self, did: &Did, at: Option<TreeState>) -> Result<TreeState> {
        match at {
            Some(state) => {
                if !state.is_consistent() {
                    return Err(WalletError::Consistency(format!(
                        "tree state {} does not hash from its roots",
                        state.state
                    )));
                }
                Ok(state)
            }
            None => self.get_did_tree_state(did).await,
        }
    }

    /// Inclusion proof of the credential's claim in the claims tree, at
    /// `at` or at the current state.
    pub async fn generate_claim_mtp(
        &self,
        did: &Did,
        credential: &W3CCredential,
        at: Option<TreeState>,
    ) -> Result<MerkleTreeProofWithTreeState> {
        let claim = self.get_core_claim_from_credential(credential)?;
        let tree_state = self.resolve_state(did, at).await?;
        let proof = self
            .storage
            .merkle_trees
            .generate_proof(
                &did.to_string(),
                MerkleTreeType::Claims,
                claim.h_index(),
                tree_state.claims_root,
            )
            .await?;
        Ok(MerkleTreeProofWithTreeState { proof, tree_state })
    }

    /// Proof that the credential's revocation nonce is absent from (or, once
    /// revoked, present in) the revocation tree.
    pub async fn generate_non_revocation_mtp(
        &self,
        did: &Did,
        credential: &W3CCredential,
        at: Option<TreeState>,
    ) -> Result<MerkleTreeProofWithTreeState> {
        let claim = self.get_core_claim_from_credential(credential)?;
        let tree_state = self.resolve_state(did, at).await?;
        let proof = self
            .storage
            .merkle_trees
            .generate_proof(
                &did.to_string(),
                MerkleTreeType::Revocations,
                Fr::from(claim.revocation_nonce()),
                tree_state.revocation_root,
            )
            .await?;
        Ok(MerkleTreeProofWithTreeState { proof, tree_state })
    }

    /// Inclusion and non-revocation proofs sharing one tree state.
    pub async fn generate_claim_proofs(
        &self,
        did: &Did,
        credential: &W3CCredential,
        at: Option<TreeState>,
    ) -> Result<(MerkleTreeProofWithTreeState, MerkleTreeProofWithTreeState)> {
        let tree_state = self.resolve_state(did, at).await?;
        let inclusion = self.generate_claim_mtp(did, credential, Some(tree_state)).await?;
        let non_revocation = self
            .generate_non_revocation_mtp(did, credential, Some(tree_state))
            .await?;
        Ok((inclusion, non_revocation))
    }

    /// Sign `payload` with the key an auth credential certifies.
    pub async fn sign(&self, payload: &[u8], credential: &W3CCredential) -> Result<Signature> {
        let public = credential.auth_public_key()?;
        let key = KeyId {
            key_type: KeyType::BabyJubJub,
            id: key_path(KeyType::BabyJubJub, &public.to_hex()?),
        };
        let bytes = self.kms.sign(&key, payload).await?;
        Ok(Signature::decompress(&bytes)?)
    }

    pub async fn sign_challenge(&self, challenge: Fr, credential: &W3CCredential) -> Result<Signature> {
        self.sign(&fr_to_le_bytes(&challenge), credential).await
    }

    pub fn get_core_claim_from_credential(&self, credential: &W3CCredential) -> Result<CoreClaim> {
        credential.core_claim()
    }

    /// Add the credentials' claims to the claims tree and the new claims
    /// root to the roots tree.
    pub async fn add_credentials_to_merkle_tree(
        &self,
        did: &Did,
        credentials: &[W3CCredential],
    ) -> Result<TreeState> {
        let _guard = self.lock(did).await;
        let identifier = did.to_string();
        let trees = &self.storage.merkle_trees;
        if credentials.is_empty() {
            return trees.snapshot(&identifier).await;
        }

        // Stage on a copy of the claims tree to learn the new claims root
        let mut claims = trees.get_merkle_tree(&identifier, MerkleTreeType::Claims).await?;
        let mut entries = Vec::with_capacity(credentials.len() + 1);
        for credential in credentials {
            let claim = credential.core_claim()?;
            claims.add(claim.h_index(), claim.h_value())?;
            entries.push((MerkleTreeType::Claims, claim.h_index(), claim.h_value()));
        }
        entries.push((MerkleTreeType::Roots, claims.root(), Fr::zero()));
        trees.add_entries(&identifier, &entries).await?;

        let state = trees.snapshot(&identifier).await?;
        debug!(did = %identifier, count = credentials.len(), state = %state.state, "Added claims");
        Ok(state)
    }

    pub async fn revoke_credential(&self, did: &Did, revocation_nonce: u64) -> Result<TreeState> {
        let _guard = self.lock(did).await;
        let identifier = did.to_string();
        self.storage
            .merkle_trees
            .add_entry(
                &identifier,
                MerkleTreeType::Revocations,
                Fr::from(revocation_nonce),
                Fr::zero(),
            )
            .await?;
        info!(did = %identifier, revocation_nonce, "Revoked claim");
        self.storage.merkle_trees.snapshot(&identifier).await
    }

    /// Issue a credential signed with the issuer's auth key.
    pub async fn issue_credential(
        &self,
        issuer: &Did,
        request: CredentialRequest,
    ) -> Result<W3CCredential> {
        let schema = self.schemas.load(&request.credential_schema).await?;
        let context = context_url(&schema)?.to_string();

        let revocation_nonce = request
            .rev_nonce
            .unwrap_or_else(|| rand::thread_rng().gen::<u64>());
        let mut claim = CoreClaim::new(schema_hash(&context, &request.credential_type));
        claim.set_revocation_nonce(revocation_nonce);
        claim.set_version(request.version);
        claim.set_expiration(
            request
                .expiration
                .map(|t| u64::try_from(t.timestamp()).unwrap_or_default()),
        );

        if let Some(subject) = request.credential_subject.get("id") {
            let subject = subject
                .as_str()
                .ok_or_else(|| WalletError::Validation("credential subject id must be a DID".into()))?;
            let subject = Did::parse(subject)?;
            match request.subject_position {
                SubjectPlacement::Index => claim.set_index_id(subject.id())?,
                SubjectPlacement::Value => claim.set_value_id(subject.id())?,
            }
        }

        match request.merklized_root_position {
            MerklizedPlacement::None => {
                for (field, slot) in serialization_slots(&schema)? {
                    if let Some(value) = request.credential_subject.get(&field) {
                        claim.set_data_slot(slot, MtValue::from_json(value)?.mt_entry())?;
                    }
                }
            }
            position => {
                let document = self.schemas.load(&context).await?;
                let root = MerklizedDocument::from_subject(
                    &request.credential_subject,
                    &request.credential_type,
                    &document,
                )?
                .root();
                if position == MerklizedPlacement::Index {
                    claim.set_index_merklized_root(root)?;
                } else {
                    claim.set_value_merklized_root(root)?;
                }
            }
        }

        let mut credential = self.build_credential(issuer, &request, &context, revocation_nonce);

        let auth = self.find_auth_credential(issuer).await?;
        let auth_claim = auth.core_claim()?;
        let tree_state = self.get_did_tree_state(issuer).await?;
        let auth_mtp = self.generate_claim_mtp(issuer, &auth, Some(tree_state)).await?;
        if !auth_mtp.proof.existence {
            return Err(WalletError::NotFound(format!(
                "auth claim of {issuer} is not in its claims tree"
            )));
        }
        let signature = self.sign(&fr_to_le_bytes(&claim.hash()), &auth).await?;

        credential.attach_proof(CredentialProof::BjjSignature(BjjSignature2021Proof {
            issuer_data: IssuerData {
                id: *issuer,
                state: IssuerState::from_tree_state(&tree_state),
                auth_core_claim: Some(auth_claim),
                mtp: Some(auth_mtp.proof),
                credential_status: Some(auth.credential_status.clone()),
            },
            core_claim: claim,
            signature: signature.to_hex()?,
        }));

        self.storage.credentials.save_credential(credential.clone()).await?;
        info!(issuer = %issuer, credential = %credential.id, "Issued credential");
        Ok(credential)
    }

    /// Attach inclusion proofs against the issuer's current trees. The
    /// claims must already be in the issuer's claims tree.
    pub async fn generate_iden3_sparse_merkle_tree_proof(
        &self,
        issuer: &Did,
        credentials: Vec<W3CCredential>,
    ) -> Result<Vec<W3CCredential>> {
        let tree_state = self.get_did_tree_state(issuer).await?;
        let auth_claim = self.find_auth_credential(issuer).await?.core_claim()?;

        let mut updated = Vec::with_capacity(credentials.len());
        for mut credential in credentials {
            let claim = credential.core_claim()?;
            let mtp = self.generate_claim_mtp(issuer, &credential, Some(tree_state)).await?;
            if !mtp.proof.existence {
                return Err(WalletError::NotFound(format!(
                    "claim of credential {} is not in the claims tree of {issuer}",
                    credential.id
                )));
            }
            credential.attach_proof(CredentialProof::Iden3SparseMerkleTree(
                Iden3SparseMerkleTreeProof {
                    issuer_data: IssuerData {
                        id: *issuer,
                        state: IssuerState::from_tree_state(&tree_state),
                        auth_core_claim: Some(auth_claim),
                        mtp: None,
                        credential_status: Some(credential.credential_status.clone()),
                    },
                    core_claim: claim,
                    mtp: mtp.proof,
                },
            ));
            self.storage.credentials.save_credential(credential.clone()).await?;
            updated.push(credential);
        }
        Ok(updated)
    }

    /// Record a published transition. Callers hold the identity lock.
    pub async fn record_transition(&self, did: &Did, new_state: Hash, tx_id: &str) -> Result<()> {
        let mut identity = self.get_identity(did).await?;
        identity.previous_state = Some(identity.state);
        identity.state = new_state;
        identity.status = IdentityStatus::Transacted;
        identity.tx_id = Some(tx_id.to_string());
        identity.modified_at = Utc::now();
        self.storage.identities.save_identity(identity).await
    }

    /// Settle the pending transition `tx_id`. A failed transition restores
    /// the previous state.
    pub async fn finalize_transition(&self, did: &Did, tx_id: &str, confirmed: bool) -> Result<()> {
        let _guard = self.lock(did).await;
        let mut identity = self.get_identity(did).await?;
        if identity.status != IdentityStatus::Transacted || identity.tx_id.as_deref() != Some(tx_id) {
            return Err(WalletError::State(format!(
                "transaction {tx_id} is not pending for {did}"
            )));
        }
        if confirmed {
            identity.status = IdentityStatus::Confirmed;
            identity.published = true;
            identity.genesis = false;
        } else {
            identity.status = IdentityStatus::Failed;
            if let Some(previous) = identity.previous_state {
                identity.state = previous;
            }
        }
        identity.modified_at = Utc::now();
        info!(did = %did, tx_id, status = ?identity.status, "Finalized state transition");
        self.storage.identities.save_identity(identity).await
    }

    async fn find_auth_credential(&self, did: &Did) -> Result<W3CCredential> {
        self.storage
            .credentials
            .list_credentials()
            .await?
            .into_iter()
            .find(|c| c.is_auth_credential() && c.issuer == *did)
            .ok_or_else(|| WalletError::NotFound(format!("no auth credential for {did}")))
    }

    fn build_credential(
        &self,
        issuer: &Did,
        request: &CredentialRequest,
        context: &str,
        revocation_nonce: u64,
    ) -> W3CCredential {
        W3CCredential {
            id: format!("{}{}", self.base_url, uuid::Uuid::new_v4()),
            context: vec![
                W3C_CREDENTIALS_CONTEXT.into(),
                IDEN3_PROOFS_CONTEXT.into(),
                context.to_string(),
            ],
            credential_type: vec![
                VERIFIABLE_CREDENTIAL_TYPE.into(),
                request.credential_type.clone(),
            ],
            expiration_date: request.expiration,
            issuance_date: Some(Utc::now()),
            credential_subject: request.credential_subject.clone(),
            credential_status: CredentialStatus {
                id: format!("{}revocation/{revocation_nonce}", self.base_url),
                status_type: CredentialStatusType::SparseMerkleTreeProof,
                revocation_nonce,
            },
            issuer: *issuer,
            credential_schema: CredentialSchema {
                id: request.credential_schema.clone(),
                schema_type: JSON_SCHEMA_TYPE.into(),
            },
            proof: Vec::new(),
        }
    }
}
