//! API route definitions.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Identities and profiles
        .route("/api/identities", post(handlers::create_identity))
        .route("/api/identities/:did", get(handlers::get_identity))
        .route("/api/identities/:did/profiles", post(handlers::create_profile))
        // Claims and their proofs
        .route("/api/identities/:did/credentials", post(handlers::issue_credential))
        .route("/api/identities/:did/revocations", post(handlers::revoke_credential))
        .route("/api/identities/:did/claims/mtp", post(handlers::claim_mtp))
        .route(
            "/api/identities/:did/claims/non-revocation",
            post(handlers::non_revocation_mtp),
        )
        // State and authentication
        .route("/api/identities/:did/state", post(handlers::transit_state))
        .route("/api/identities/:did/auth-inputs", post(handlers::auth_inputs))
        // Verification
        .route("/api/proofs/verify", post(handlers::verify_proof))
        .route("/api/state/verify", post(handlers::verify_state))
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use identity_circuits::{MerkleTreeProofWithTreeState, TreeState};
    use identity_prover::CircuitKeys;
    use identity_wallet::storage::IdentityStatus;

    use super::*;
    use crate::config::ServerConfig;
    use crate::handlers::{
        CreateIdentityResponse, ErrorResponse, IdentityResponse, IssueCredentialResponse,
        ProfileResponse, TransitStateResponse, VerifyResponse,
    };

    const DEPTH: usize = 16;
    const KYC_SCHEMA: &str = "https://example.com/schemas/kyc.json";

    fn keys() -> CircuitKeys {
        static KEYS: OnceLock<CircuitKeys> = OnceLock::new();
        KEYS.get_or_init(|| CircuitKeys::setup(DEPTH, &mut StdRng::seed_from_u64(11)).unwrap())
            .clone()
    }

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        _dir: tempfile::TempDir,
    }

    async fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("kyc.json");
        let schema = json!({
            "$metadata": {
                "uris": {"jsonLdContext": "https://example.com/schemas/kyc.jsonld"},
                "serialization": {"indexDataSlotA": "birthday", "valueDataSlotA": "documentType"}
            },
            "type": "object"
        });
        std::fs::write(&schema_path, schema.to_string()).unwrap();

        let mut config = ServerConfig::default();
        config.wallet.tree_depth = DEPTH;
        config.schemas.insert(KYC_SCHEMA.into(), schema_path);

        let state = Arc::new(AppState::new(&config, keys()).await.unwrap());
        let router = Router::new()
            .merge(api_routes())
            .with_state(state.clone());
        TestApp {
            router,
            state,
            _dir: dir,
        }
    }

    impl TestApp {
        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json");
            let request = match body {
                Some(body) => request.body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, bytes.to_vec())
        }

        async fn post<T: DeserializeOwned>(&self, uri: &str, body: Value, expected: StatusCode) -> T {
            let (status, bytes) = self.call(Method::POST, uri, Some(body)).await;
            assert_eq!(status, expected, "{}", String::from_utf8_lossy(&bytes));
            serde_json::from_slice(&bytes).unwrap()
        }

        async fn create_identity(&self, seed: &str) -> CreateIdentityResponse {
            self.post("/api/identities", json!({"seed": seed}), StatusCode::CREATED)
                .await
        }

        async fn issue(&self, issuer: &str, holder: &str) -> IssueCredentialResponse {
            self.post(
                &format!("/api/identities/{issuer}/credentials"),
                json!({
                    "credentialSchema": KYC_SCHEMA,
                    "type": "KYCAgeCredential",
                    "credentialSubject": {
                        "id": holder,
                        "birthday": 19960424,
                        "documentType": 2
                    },
                    "revNonce": 1000
                }),
                StatusCode::CREATED,
            )
            .await
        }

        async fn gist_root_valid(&self, root: &str) -> (StatusCode, Vec<u8>) {
            self.call(
                Method::POST,
                "/api/state/verify",
                Some(json!({"circuitId": "authV2", "pubSignals": ["1", "2", root]})),
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = app.call(Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_identity_and_profiles() {
        let app = app().await;
        let created = app.create_identity("0x0102").await;
        assert!(created.tree_state.is_consistent());
        let did = created.did.to_string();

        let (status, body) = app
            .call(Method::GET, &format!("/api/identities/{did}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let identity: IdentityResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(identity.identity.status, IdentityStatus::Created);
        assert_eq!(identity.identity.state, created.tree_state.state);

        // Same seed, same genesis state
        let (status, _) = app
            .call(Method::POST, "/api/identities", Some(json!({"seed": "0102"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/identities/{did}/profiles");
        let profile: ProfileResponse = app
            .post(&uri, json!({"nonce": 1, "verifier": "v1"}), StatusCode::CREATED)
            .await;
        assert_ne!(profile.did, created.did);

        let error: ErrorResponse = app
            .post(&uri, json!({"nonce": 1, "verifier": "v2"}), StatusCode::CONFLICT)
            .await;
        assert!(error.error.contains("already exists"));

        let (status, _) = app
            .call(Method::GET, "/api/identities/did:example:nope", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_claim_proofs() {
        let app = app().await;
        let created = app.create_identity("aa").await;
        let did = created.did.to_string();
        let body = json!({"credential": created.auth_credential});

        let mtp: MerkleTreeProofWithTreeState = app
            .post(&format!("/api/identities/{did}/claims/mtp"), body.clone(), StatusCode::OK)
            .await;
        assert!(mtp.proof.existence);
        assert_eq!(mtp.tree_state, created.tree_state);

        let non_rev: MerkleTreeProofWithTreeState = app
            .post(
                &format!("/api/identities/{did}/claims/non-revocation"),
                body,
                StatusCode::OK,
            )
            .await;
        assert!(!non_rev.proof.existence);

        let mut broken = created.tree_state;
        broken.state = broken.claims_root;
        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/identities/{did}/claims/mtp"),
                Some(json!({"credential": created.auth_credential, "treeState": broken})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_state_transitions_and_gist_roots() {
        let app = app().await;
        let issuer = app.create_identity("01").await;
        let holder = app.create_identity("02").await;
        let did = issuer.did.to_string();
        let state_uri = format!("/api/identities/{did}/state");

        let issued = app.issue(&did, &holder.did.to_string()).await;
        assert_ne!(issued.tree_state.state, issuer.tree_state.state);

        let first: TransitStateResponse = app
            .post(
                &state_uri,
                json!({"oldTreeState": issuer.tree_state}),
                StatusCode::OK,
            )
            .await;
        assert_eq!(first.status, IdentityStatus::Confirmed);
        assert_eq!(first.new_state, issued.tree_state.state);
        let first_root = app.state.states.gist_root().await.to_decimal();

        let (status, body) = app.gist_root_valid(&first_root).await;
        assert_eq!(status, StatusCode::OK);
        assert!(serde_json::from_slice::<VerifyResponse>(&body).unwrap().valid);

        // Nothing changed since the last publication
        let (status, _) = app
            .call(
                Method::POST,
                &state_uri,
                Some(json!({"oldTreeState": issued.tree_state})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let revoked: TreeState = app
            .post(
                &format!("/api/identities/{did}/revocations"),
                json!({"revocationNonce": 1000}),
                StatusCode::OK,
            )
            .await;
        let second: TransitStateResponse = app
            .post(
                &state_uri,
                json!({"oldTreeState": issued.tree_state}),
                StatusCode::OK,
            )
            .await;
        assert_eq!(second.new_state, revoked.state);

        let (_, body) = app.gist_root_valid(&first_root).await;
        assert!(!serde_json::from_slice::<VerifyResponse>(&body).unwrap().valid);

        let (status, _) = app.gist_root_valid("12345").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_auth_inputs_and_unsupported_verification() {
        let app = app().await;
        let created = app.create_identity("03").await;
        let did = created.did.to_string();

        let inputs: Value = app
            .post(
                &format!("/api/identities/{did}/auth-inputs"),
                json!({"hash": "0102"}),
                StatusCode::OK,
            )
            .await;
        assert_eq!(inputs["challenge"], "258");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/identities/{did}/auth-inputs"),
                Some(json!({"hash": hex::encode([7u8; 33])})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/proofs/verify",
                Some(json!({
                    "circuitId": "authV2",
                    "proof": {
                        "pi_a": ["1", "2", "1"],
                        "pi_b": [["1", "0"], ["2", "0"], ["1", "0"]],
                        "pi_c": ["1", "2", "1"],
                        "protocol": "groth16",
                        "curve": "bn128"
                    },
                    "pub_signals": ["0"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
