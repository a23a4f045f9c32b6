//! W3C verifiable credentials and the proofs attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use identity_circuits::{CoreClaim, Did, Hash, Proof, PublicKey, Signature, TreeState};

use crate::error::{Result, WalletError};

pub const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const IDEN3_PROOFS_CONTEXT: &str = "https://schema.iden3.io/core/jsonld/iden3proofs.jsonld";
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

pub const AUTH_BJJ_CREDENTIAL_TYPE: &str = "AuthBJJCredential";
pub const AUTH_BJJ_SCHEMA_URL: &str = "https://schema.iden3.io/core/json/auth.json";
pub const AUTH_BJJ_CONTEXT_URL: &str = "https://schema.iden3.io/core/jsonld/auth.jsonld";

/// JSON-LD schema type of a credential schema reference.
pub const JSON_SCHEMA_TYPE: &str = "JsonSchema2023";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatusType {
    SparseMerkleTreeProof,
    Iden3ReverseSparseMerkleTreeProof,
    #[serde(rename = "Iden3commRevocationStatusV1.0")]
    Iden3CommRevocationStatusV1,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: CredentialStatusType,
    pub revocation_nonce: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSchema {
    pub id: String,
    #[serde(rename = "type")]
    pub schema_type: String,
}

/// Issuer state a proof was produced against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerState {
    pub value: Hash,
    #[serde(default)]
    pub claims_tree_root: Hash,
    #[serde(default)]
    pub revocation_tree_root: Hash,
    #[serde(default)]
    pub root_of_roots: Hash,
}

impl IssuerState {
    pub fn from_tree_state(state: &TreeState) -> Self {
        Self {
            value: state.state,
            claims_tree_root: state.claims_root,
            revocation_tree_root: state.revocation_root,
            root_of_roots: state.root_of_roots,
        }
    }

    /// The state as a tree state; fails if it does not open to its roots.
    pub fn tree_state(&self) -> Result<TreeState> {
        let state = TreeState {
            state: self.value,
            claims_root: self.claims_tree_root,
            revocation_root: self.revocation_tree_root,
            root_of_roots: self.root_of_roots,
        };
        if !state.is_consistent() {
            return Err(WalletError::Consistency(format!(
                "issuer state {} does not hash from its roots",
                self.value
            )));
        }
        Ok(state)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerData {
    pub id: Did,
    pub state: IssuerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_core_claim: Option<CoreClaim>,
    /// Inclusion of the auth claim in the issuer's claims tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtp: Option<Proof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iden3SparseMerkleTreeProof {
    pub issuer_data: IssuerData,
    pub core_claim: CoreClaim,
    pub mtp: Proof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BjjSignature2021Proof {
    pub issuer_data: IssuerData,
    pub core_claim: CoreClaim,
    /// Hex of the compressed signature over the claim hash
    pub signature: String,
}

impl BjjSignature2021Proof {
    pub fn signature(&self) -> Result<Signature> {
        Ok(Signature::from_hex(&self.signature)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CredentialProof {
    #[serde(rename = "Iden3SparseMerkleTreeProof")]
    Iden3SparseMerkleTree(Iden3SparseMerkleTreeProof),
    #[serde(rename = "BJJSignature2021")]
    BjjSignature(BjjSignature2021Proof),
}

/// The proofs a credential carries, resolved once.
#[derive(Clone, Copy, Debug)]
pub enum ProofEvidence<'a> {
    Inclusion(&'a Iden3SparseMerkleTreeProof),
    Signature(&'a BjjSignature2021Proof),
    Both {
        inclusion: &'a Iden3SparseMerkleTreeProof,
        signature: &'a BjjSignature2021Proof,
    },
}

impl<'a> ProofEvidence<'a> {
    /// The core claim the evidence commits to. When both proofs are present
    /// their claims must match bit for bit.
    pub fn core_claim(&self) -> Result<CoreClaim> {
        match self {
            Self::Inclusion(p) => Ok(p.core_claim),
            Self::Signature(p) => Ok(p.core_claim),
            Self::Both {
                inclusion,
                signature,
            } => {
                if inclusion.core_claim != signature.core_claim {
                    return Err(WalletError::Consistency(
                        "core claims of inclusion and signature proofs differ".into(),
                    ));
                }
                Ok(inclusion.core_claim)
            }
        }
    }

    pub fn inclusion(&self) -> Option<&'a Iden3SparseMerkleTreeProof> {
        match self {
            Self::Inclusion(p) | Self::Both { inclusion: p, .. } => Some(p),
            Self::Signature(_) => None,
        }
    }

    pub fn signature(&self) -> Option<&'a BjjSignature2021Proof> {
        match self {
            Self::Signature(p) | Self::Both { signature: p, .. } => Some(p),
            Self::Inclusion(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct W3CCredential {
    pub id: String,
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<DateTime<Utc>>,
    pub credential_subject: Map<String, Value>,
    pub credential_status: CredentialStatus,
    pub issuer: Did,
    pub credential_schema: CredentialSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proof: Vec<CredentialProof>,
}

impl W3CCredential {
    pub fn evidence(&self) -> Result<ProofEvidence<'_>> {
        let inclusion = self.proof.iter().find_map(|p| match p {
            CredentialProof::Iden3SparseMerkleTree(p) => Some(p),
            _ => None,
        });
        let signature = self.proof.iter().find_map(|p| match p {
            CredentialProof::BjjSignature(p) => Some(p),
            _ => None,
        });
        match (inclusion, signature) {
            (Some(inclusion), Some(signature)) => Ok(ProofEvidence::Both {
                inclusion,
                signature,
            }),
            (Some(p), None) => Ok(ProofEvidence::Inclusion(p)),
            (None, Some(p)) => Ok(ProofEvidence::Signature(p)),
            (None, None) => Err(WalletError::NotFound(format!(
                "credential {} carries no core claim proof",
                self.id
            ))),
        }
    }

    pub fn core_claim(&self) -> Result<CoreClaim> {
        self.evidence()?.core_claim()
    }

    /// Replace any proof of the same kind.
    pub fn attach_proof(&mut self, proof: CredentialProof) {
        self.proof
            .retain(|p| std::mem::discriminant(p) != std::mem::discriminant(&proof));
        self.proof.push(proof);
    }

    pub fn has_type(&self, credential_type: &str) -> bool {
        self.credential_type.iter().any(|t| t == credential_type)
    }

    pub fn is_auth_credential(&self) -> bool {
        self.has_type(AUTH_BJJ_CREDENTIAL_TYPE)
    }

    /// The BabyJubJub key an auth credential certifies.
    pub fn auth_public_key(&self) -> Result<PublicKey> {
        if !self.is_auth_credential() {
            return Err(WalletError::Validation(format!(
                "credential {} is not an auth credential",
                self.id
            )));
        }
        let coordinate = |name: &str| {
            self.credential_subject
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    WalletError::NotFound(format!("auth credential has no {name} coordinate"))
                })
        };
        Ok(PublicKey::from_decimal(coordinate("x")?, coordinate("y")?)?)
    }

    /// The schema type the credential was issued under (last type entry).
    pub fn schema_type(&self) -> Option<&str> {
        self.credential_type
            .iter()
            .rev()
            .find(|t| *t != VERIFIABLE_CREDENTIAL_TYPE)
            .map(String::as_str)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn revocation_nonce(&self) -> u64 {
        self.credential_status.revocation_nonce
    }
}

/// Non-revocation evidence for a revocation nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationStatus {
    pub issuer: TreeState,
    pub mtp: Proof,
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        self.mtp.existence
    }
}

/// Where to put the subject id in an issued claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectPlacement {
    #[default]
    Index,
    Value,
}

/// Where to put the merklized root in an issued claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerklizedPlacement {
    /// Non-merklized: fields go to data slots
    #[default]
    None,
    Index,
    Value,
}

/// What an issuer is asked to issue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    /// JSON schema URL
    pub credential_schema: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub credential_subject: Map<String, Value>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rev_nonce: Option<u64>,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub subject_position: SubjectPlacement,
    #[serde(default)]
    pub merklized_root_position: MerklizedPlacement,
}
