//! HTTP request handlers for identity management and proofs.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use identity_circuits::{CircuitId, Did, Hash, MerkleTreeProofWithTreeState, TreeState};
use identity_prover::ZkProof;
use identity_wallet::storage::{Identity, IdentityStatus};
use identity_wallet::{CredentialRequest, ErrorKind, W3CCredential, WalletError};

use crate::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wallet failure rendered as a status code and an `ErrorResponse`.
#[derive(Debug)]
pub struct ApiError(WalletError);

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        Self(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Consistency | ErrorKind::State => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, status = %status, "Request rejected");
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_did(did: &str) -> Result<Did, ApiError> {
    did.parse::<Did>().map_err(|e| WalletError::from(e).into())
}

// ============ Identities ============

#[derive(Default, Deserialize)]
pub struct CreateIdentityRequest {
    /// Hex seed for the auth key; random when absent
    #[serde(default)]
    pub seed: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityResponse {
    pub did: Did,
    pub auth_credential: W3CCredential,
    pub tree_state: TreeState,
}

pub async fn create_identity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIdentityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let seed = match req.seed {
        Some(seed) => hex::decode(seed.trim_start_matches("0x"))
            .map_err(|e| WalletError::Validation(format!("Invalid hex seed: {e}")))?,
        None => {
            let mut seed = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed);
            seed
        }
    };

    let (did, auth_credential) = state.wallet.create_identity(&seed).await?;
    let tree_state = state.wallet.get_did_tree_state(&did).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateIdentityResponse {
            did,
            auth_credential,
            tree_state,
        }),
    ))
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub identity: Identity,
    pub tree_state: TreeState,
}

pub async fn get_identity(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
) -> ApiResult<IdentityResponse> {
    let did = parse_did(&did)?;
    let identity = state.wallet.get_identity(&did).await?;
    let tree_state = state.wallet.get_did_tree_state(&did).await?;
    Ok(Json(IdentityResponse {
        identity,
        tree_state,
    }))
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub nonce: u64,
    pub verifier: String,
}

#[derive(Serialize, Deserialize)]
pub struct ProfileResponse {
    pub did: Did,
}

pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let did = parse_did(&did)?;
    let profile = state
        .wallet
        .create_profile(&did, req.nonce, &req.verifier)
        .await?;
    Ok((StatusCode::CREATED, Json(ProfileResponse { did: profile })))
}

// ============ Claims ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProofRequest {
    pub credential: W3CCredential,
    /// Prove against this state instead of the current one
    #[serde(default)]
    pub tree_state: Option<TreeState>,
}

pub async fn claim_mtp(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<ClaimProofRequest>,
) -> ApiResult<MerkleTreeProofWithTreeState> {
    let did = parse_did(&did)?;
    let proof = state
        .wallet
        .generate_claim_mtp(&did, &req.credential, req.tree_state)
        .await?;
    Ok(Json(proof))
}

pub async fn non_revocation_mtp(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<ClaimProofRequest>,
) -> ApiResult<MerkleTreeProofWithTreeState> {
    let did = parse_did(&did)?;
    let proof = state
        .wallet
        .generate_non_revocation_mtp(&did, &req.credential, req.tree_state)
        .await?;
    Ok(Json(proof))
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialResponse {
    pub credential: W3CCredential,
    /// Issuer state after the claim was added
    pub tree_state: TreeState,
}

/// Issue a credential and add its claim to the issuer's claims tree.
pub async fn issue_credential(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<CredentialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issuer = parse_did(&did)?;
    let credential = state.wallet.issue_credential(&issuer, req).await?;
    let tree_state = state
        .wallet
        .add_credentials_to_merkle_tree(&issuer, std::slice::from_ref(&credential))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueCredentialResponse {
            credential,
            tree_state,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub revocation_nonce: u64,
}

pub async fn revoke_credential(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<RevokeRequest>,
) -> ApiResult<TreeState> {
    let did = parse_did(&did)?;
    let tree_state = state
        .wallet
        .revoke_credential(&did, req.revocation_nonce)
        .await?;
    Ok(Json(tree_state))
}

// ============ State ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitStateRequest {
    /// Last published tree state of the identity
    pub old_tree_state: TreeState,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitStateResponse {
    pub tx_id: String,
    pub new_state: Hash,
    pub status: IdentityStatus,
}

/// Prove and publish the identity's current trees. The local registry
/// settles a publication immediately, so the transition is confirmed here.
pub async fn transit_state(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<TransitStateRequest>,
) -> ApiResult<TransitStateResponse> {
    let did = parse_did(&did)?;
    let is_genesis = state.wallet.get_identity(&did).await?.genesis;

    let tx_id = state
        .proofs
        .transit_state(
            &did,
            &req.old_tree_state,
            is_genesis,
            state.states.as_ref(),
            &state.signer,
        )
        .await?;
    state
        .proofs
        .finalize_state_transition(&did, &tx_id, true)
        .await?;

    let identity = state.wallet.get_identity(&did).await?;
    info!(did = %did, tx_id = %tx_id, state = %identity.state, "State transition confirmed");
    Ok(Json(TransitStateResponse {
        tx_id,
        new_state: identity.state,
        status: identity.status,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInputsRequest {
    /// Hex message hash, at most 32 bytes
    pub hash: String,
    #[serde(default)]
    pub profile_nonce: u64,
}

pub async fn auth_inputs(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
    Json(req): Json<AuthInputsRequest>,
) -> ApiResult<Value> {
    let did = parse_did(&did)?;
    let hash = hex::decode(req.hash.trim_start_matches("0x"))
        .map_err(|e| WalletError::Validation(format!("Invalid hex hash: {e}")))?;
    let inputs = state
        .proofs
        .generate_auth_v2_inputs(&hash, &did, req.profile_nonce, CircuitId::AuthV2)
        .await?;
    Ok(Json(serde_json::from_slice(&inputs).map_err(WalletError::from)?))
}

// ============ Verification ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofRequest {
    pub circuit_id: CircuitId,
    #[serde(flatten)]
    pub proof: ZkProof,
}

#[derive(Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

pub async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyProofRequest>,
) -> ApiResult<VerifyResponse> {
    let valid = state.proofs.verify_proof(&req.proof, req.circuit_id).await?;
    Ok(Json(VerifyResponse { valid }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStateRequest {
    pub circuit_id: CircuitId,
    pub pub_signals: Vec<String>,
}

pub async fn verify_state(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyStateRequest>,
) -> ApiResult<VerifyResponse> {
    let valid = state
        .proofs
        .verify_state(req.circuit_id, &req.pub_signals)
        .await?;
    Ok(Json(VerifyResponse { valid }))
}
