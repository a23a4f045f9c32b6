//! Wallet configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use identity_circuits::inputs::CLAIM_LEVELS;
use identity_circuits::smt::DEFAULT_DEPTH;
use identity_circuits::{DidMethod, DidType, Network};

use crate::error::{Result, WalletError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Base URL credentials and revocation endpoints are issued under
    pub host_url: String,
    pub did_method: String,
    pub blockchain: String,
    pub network: String,
    /// Depth of every identity's claims, revocation and roots trees
    pub tree_depth: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            host_url: "http://localhost:8001/api/v1".to_string(),
            did_method: "iden3".to_string(),
            blockchain: "polygon".to_string(),
            network: "mumbai".to_string(),
            tree_depth: DEFAULT_DEPTH,
        }
    }
}

impl WalletConfig {
    /// Load from a TOML file (defaults when absent), apply environment
    /// overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| WalletError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| WalletError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("IDENTITY_HOST_URL") {
            self.host_url = url;
        }

        // `<blockchain>:<network>`, e.g. `polygon:main`
        if let Ok(network) = std::env::var("IDENTITY_NETWORK") {
            if let Some((chain, net)) = network.split_once(':') {
                self.blockchain = chain.to_string();
                self.network = net.to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_url.is_empty() {
            return Err(WalletError::Config("host_url cannot be empty".into()));
        }
        // Circuits take at most CLAIM_LEVELS siblings
        if self.tree_depth == 0 || self.tree_depth > CLAIM_LEVELS {
            return Err(WalletError::Config(format!(
                "tree_depth must be in 1..={CLAIM_LEVELS}, got {}",
                self.tree_depth
            )));
        }
        self.did_type()?;
        Ok(())
    }

    /// Id type new identities are created with.
    pub fn did_type(&self) -> Result<DidType> {
        let method: DidMethod = self
            .did_method
            .parse()
            .map_err(|e| WalletError::Config(format!("{e}")))?;
        let network = Network::from_segments(&self.blockchain, &self.network)
            .map_err(|e| WalletError::Config(format!("{e}")))?;
        Ok(DidType::new(method, network))
    }

    /// Host URL with exactly one trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}/", self.host_url.trim_end_matches('/'))
    }
}
