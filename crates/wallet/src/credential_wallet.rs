//! Credential lookup and revocation status resolution.

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use tracing::debug;

use identity_circuits::Did;

use crate::credential::{CredentialStatus, CredentialStatusType, RevocationStatus, W3CCredential};
use crate::error::{Result, WalletError};
use crate::storage::{CredentialStorage, MerkleTreeStorage, MerkleTreeType};

/// Resolves the revocation status a credential status points to.
#[async_trait]
pub trait RevocationResolver: Send + Sync {
    async fn resolve(&self, status: &CredentialStatus, issuer: &Did) -> Result<RevocationStatus>;
}

/// Resolves `SparseMerkleTreeProof` statuses of issuers whose trees live in
/// the local tree storage.
pub struct LocalRevocationResolver {
    trees: Arc<dyn MerkleTreeStorage>,
}

impl LocalRevocationResolver {
    pub fn new(trees: Arc<dyn MerkleTreeStorage>) -> Self {
        Self { trees }
    }
}

#[async_trait]
impl RevocationResolver for LocalRevocationResolver {
    async fn resolve(&self, status: &CredentialStatus, issuer: &Did) -> Result<RevocationStatus> {
        if status.status_type != CredentialStatusType::SparseMerkleTreeProof {
            return Err(WalletError::Validation(format!(
                "revocation status type {:?} cannot be resolved locally",
                status.status_type
            )));
        }
        let identifier = issuer.to_string();
        let state = self.trees.snapshot(&identifier).await?;
        let mtp = self
            .trees
            .generate_proof(
                &identifier,
                MerkleTreeType::Revocations,
                Fr::from(status.revocation_nonce),
                state.revocation_root,
            )
            .await?;
        Ok(RevocationStatus { issuer: state, mtp })
    }
}

#[async_trait]
pub trait CredentialWallet: Send + Sync {
    /// A non-revoked auth credential issued by `did` to itself.
    async fn get_auth_bjj_credential(&self, did: &Did) -> Result<W3CCredential>;

    /// The first credential that is not revoked, with its revocation status.
    async fn find_non_revoked_credential(
        &self,
        credentials: &[W3CCredential],
    ) -> Result<(W3CCredential, RevocationStatus)>;

    async fn get_revocation_status(
        &self,
        status: &CredentialStatus,
        issuer: &Did,
    ) -> Result<RevocationStatus>;
}

pub struct LocalCredentialWallet {
    storage: Arc<dyn CredentialStorage>,
    resolver: Arc<dyn RevocationResolver>,
}

impl LocalCredentialWallet {
    pub fn new(storage: Arc<dyn CredentialStorage>, resolver: Arc<dyn RevocationResolver>) -> Self {
        Self { storage, resolver }
    }
}

#[async_trait]
impl CredentialWallet for LocalCredentialWallet {
    async fn get_auth_bjj_credential(&self, did: &Did) -> Result<W3CCredential> {
        let candidates: Vec<W3CCredential> = self
            .storage
            .list_credentials()
            .await?
            .into_iter()
            .filter(|c| c.is_auth_credential() && c.issuer == *did)
            .collect();
        if candidates.is_empty() {
            return Err(WalletError::NotFound(format!("no auth credential for {did}")));
        }
        let (credential, _) = self.find_non_revoked_credential(&candidates).await?;
        Ok(credential)
    }

    async fn find_non_revoked_credential(
        &self,
        credentials: &[W3CCredential],
    ) -> Result<(W3CCredential, RevocationStatus)> {
        for credential in credentials {
            let status = self
                .get_revocation_status(&credential.credential_status, &credential.issuer)
                .await?;
            if !status.is_revoked() {
                return Ok((credential.clone(), status));
            }
            debug!(credential = %credential.id, "Skipping revoked credential");
        }
        Err(WalletError::NotFound("all credentials are revoked".into()))
    }

    async fn get_revocation_status(
        &self,
        status: &CredentialStatus,
        issuer: &Did,
    ) -> Result<RevocationStatus> {
        self.resolver.resolve(status, issuer).await
    }
}
