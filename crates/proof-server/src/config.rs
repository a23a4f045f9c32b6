//! Server configuration.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use identity_wallet::WalletConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid listen address {0}")]
    ListenAddr(String),
    #[error("Invalid schema document {0}: {1}")]
    Schema(String, String),
    #[error(transparent)]
    Wallet(#[from] identity_wallet::WalletError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Directory holding (or receiving) the Groth16 keys
    pub keys_dir: PathBuf,
    pub wallet: WalletConfig,
    /// JSON schemas and JSON-LD contexts served to the wallet, by URL
    pub schemas: BTreeMap<String, PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            keys_dir: PathBuf::from("keys"),
            wallet: WalletConfig::default(),
            schemas: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, falling back to defaults when it is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: Self = if path.exists() {
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        if let Ok(addr) = std::env::var("IDENTITY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        config.wallet.validate()?;
        config.socket_addr()?;
        Ok(config)
    }

    /// Read every configured schema document.
    pub fn schema_documents(&self) -> Result<Vec<(String, serde_json::Value)>, ConfigError> {
        self.schemas
            .iter()
            .map(|(url, path)| {
                let document = serde_json::from_str(&std::fs::read_to_string(path)?)
                    .map_err(|e| ConfigError::Schema(url.clone(), e.to_string()))?;
                Ok((url.clone(), document))
            })
            .collect()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::ListenAddr(self.listen_addr.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_wallet_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(
            &path,
            "listen_addr = \"127.0.0.1:8080\"\n\n[wallet]\ntree_depth = 20\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert_eq!(config.wallet.tree_depth, 20);
        assert_eq!(config.keys_dir, PathBuf::from("keys"));
    }

    #[test]
    fn test_schema_documents() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("kyc.json");
        std::fs::write(&schema, r#"{"$metadata": {"uris": {}}}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let mut config = ServerConfig::default();
        config
            .schemas
            .insert("https://example.com/kyc.json".into(), schema);
        let documents = config.schema_documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].1.get("$metadata").is_some());

        config.schemas.insert(
            "https://example.com/broken.json".into(),
            dir.path().join("broken.json"),
        );
        assert!(matches!(config.schema_documents(), Err(ConfigError::Schema(..))));
    }

    #[test]
    fn test_bad_listen_addr() {
        let config = ServerConfig {
            listen_addr: "nowhere".into(),
            ..Default::default()
        };
        assert!(matches!(config.socket_addr(), Err(ConfigError::ListenAddr(_))));
    }
}
