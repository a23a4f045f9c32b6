//! HTTP API server for identity management and proof generation.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod routes;

use identity_prover::{CircuitKeys, Groth16Prover};
use identity_wallet::storage::{
    InMemoryCredentialStorage, InMemoryIdentityStorage, InMemoryMerkleTreeStorage,
    InMemoryStateStorage, LocalSigner,
};
use identity_wallet::{
    DataStorage, IdentityWallet, Kms, LocalCredentialWallet, LocalRevocationResolver,
    ProofService, QueryTranslator, StaticSchemaLoader,
};

use crate::config::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub wallet: Arc<IdentityWallet>,
    pub proofs: ProofService,
    pub states: Arc<InMemoryStateStorage>,
    pub signer: LocalSigner,
}

impl AppState {
    /// Wire in-memory storages, the key service and the Groth16 prover.
    pub async fn new(
        config: &ServerConfig,
        keys: CircuitKeys,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let depth = config.wallet.tree_depth;
        if keys.depth() != depth {
            return Err(format!(
                "circuit keys are for depth {}, wallet trees have depth {depth}",
                keys.depth()
            )
            .into());
        }

        let schemas = Arc::new(StaticSchemaLoader::new());
        for (url, document) in config.schema_documents()? {
            schemas.insert(url, document).await;
        }

        let prover = Arc::new(Groth16Prover::new(Arc::new(keys)));
        let trees = Arc::new(InMemoryMerkleTreeStorage::new(depth)?);
        let credential_store = Arc::new(InMemoryCredentialStorage::new());
        let states = Arc::new(InMemoryStateStorage::new()?.with_verifier(prover.clone()));
        let storage = DataStorage {
            merkle_trees: trees.clone(),
            identities: Arc::new(InMemoryIdentityStorage::new()),
            credentials: credential_store.clone(),
            states: states.clone(),
        };

        let wallet = Arc::new(IdentityWallet::new(
            Arc::new(Kms::in_memory()),
            storage,
            schemas.clone(),
            &config.wallet,
        )?);
        let credentials = Arc::new(LocalCredentialWallet::new(
            credential_store,
            Arc::new(LocalRevocationResolver::new(trees)),
        ));
        let proofs = ProofService::new(
            wallet.clone(),
            credentials,
            prover,
            states.clone(),
            QueryTranslator::new(schemas),
        );

        Ok(Self {
            wallet,
            proofs,
            states,
            signer: LocalSigner::random(),
        })
    }
}

fn load_or_setup_keys(dir: &Path, depth: usize) -> Result<CircuitKeys, Box<dyn std::error::Error>> {
    if dir.join("manifest.json").exists() {
        info!(dir = %dir.display(), "Loading circuit keys");
        return Ok(CircuitKeys::load_from_directory(dir)?);
    }
    info!(depth, "Running trusted setup (this may take a while)");
    let keys = CircuitKeys::setup(depth, &mut StdRng::from_entropy())?;
    keys.save_to_directory(dir)?;
    info!(dir = %dir.display(), "Circuit keys saved");
    Ok(keys)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("PROOF_SERVER_CONFIG").unwrap_or_else(|_| "server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;
    info!(listen = %config.listen_addr, depth = config.wallet.tree_depth, "Starting proof server");

    let keys = load_or_setup_keys(&config.keys_dir, config.wallet.tree_depth)?;
    let state = Arc::new(AppState::new(&config, keys).await?);

    let app = Router::new()
        .merge(routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = config.socket_addr()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
