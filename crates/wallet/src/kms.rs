//! Key management: key providers per key type over a private key store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use identity_circuits::encoding::fr_from_le_bytes;
use identity_circuits::{PrivateKey, PublicKey};

use crate::error::{Result, WalletError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "BJJ")]
    BabyJubJub,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BabyJubJub => "BJJ",
        }
    }
}

/// Reference to a key held by the KMS.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId {
    pub key_type: KeyType,
    pub id: String,
}

/// Store alias of a key: `<type>:<public key hex>`.
pub fn key_path(key_type: KeyType, public_key_hex: &str) -> String {
    format!("{}:{}", key_type.as_str(), public_key_hex)
}

#[async_trait]
pub trait PrivateKeyStore: Send + Sync {
    async fn get(&self, alias: &str) -> Result<String>;
    async fn import(&self, alias: &str, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryPrivateKeyStore {
    data: RwLock<HashMap<String, String>>,
}

impl InMemoryPrivateKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrivateKeyStore for InMemoryPrivateKeyStore {
    async fn get(&self, alias: &str) -> Result<String> {
        self.data
            .read()
            .await
            .get(alias)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("no key under alias {alias}")))
    }

    async fn import(&self, alias: &str, key: &str) -> Result<()> {
        self.data
            .write()
            .await
            .insert(alias.to_string(), key.to_string());
        Ok(())
    }
}

#[async_trait]
pub trait KeyProvider: Send + Sync {
    fn key_type(&self) -> KeyType;

    async fn new_key_from_seed(&self, seed: &[u8]) -> Result<KeyId>;

    async fn public_key(&self, key: &KeyId) -> Result<PublicKey>;

    /// Sign `data`, returning the encoded signature.
    async fn sign(&self, key: &KeyId, data: &[u8]) -> Result<Vec<u8>>;
}

/// BabyJubJub keys. Private keys are `SHA-256(seed)`; `sign` expects the
/// 32-byte little-endian encoding of a field element and returns a
/// compressed signature.
pub struct BjjProvider {
    store: Arc<dyn PrivateKeyStore>,
}

impl BjjProvider {
    pub fn new(store: Arc<dyn PrivateKeyStore>) -> Self {
        Self { store }
    }

    async fn private_key(&self, key: &KeyId) -> Result<PrivateKey> {
        let stored = self.store.get(&key.id).await?;
        let bytes: [u8; 32] = hex::decode(&stored)
            .map_err(|e| WalletError::Kms(e.to_string()))?
            .try_into()
            .map_err(|_| WalletError::Kms("stored key must be 32 bytes".into()))?;
        PrivateKey::from_bytes(bytes).map_err(|e| WalletError::Kms(e.to_string()))
    }
}

#[async_trait]
impl KeyProvider for BjjProvider {
    fn key_type(&self) -> KeyType {
        KeyType::BabyJubJub
    }

    async fn new_key_from_seed(&self, seed: &[u8]) -> Result<KeyId> {
        let bytes: [u8; 32] = Sha256::digest(seed).into();
        let key = PrivateKey::from_bytes(bytes).map_err(|e| WalletError::Kms(e.to_string()))?;
        let public_hex = key.public().to_hex()?;

        let id = KeyId {
            key_type: KeyType::BabyJubJub,
            id: key_path(KeyType::BabyJubJub, &public_hex),
        };
        self.store.import(&id.id, &hex::encode(bytes)).await?;
        debug!(key = %id.id, "Imported BJJ key");
        Ok(id)
    }

    async fn public_key(&self, key: &KeyId) -> Result<PublicKey> {
        Ok(self.private_key(key).await?.public())
    }

    async fn sign(&self, key: &KeyId, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() != 32 {
            return Err(WalletError::Kms(format!(
                "BJJ signing payload must be 32 bytes, got {}",
                data.len()
            )));
        }
        let message = fr_from_le_bytes(data)?;
        let signature = self.private_key(key).await?.sign_poseidon(message);
        Ok(signature.compress()?.to_vec())
    }
}

/// Dispatches key operations to the provider registered for the key type.
#[derive(Default)]
pub struct Kms {
    providers: HashMap<KeyType, Arc<dyn KeyProvider>>,
}

impl Kms {
    pub fn new() -> Self {
        Self::default()
    }

    /// KMS with a BJJ provider over an in-memory key store.
    pub fn in_memory() -> Self {
        let mut kms = Self::new();
        kms.register_key_provider(Arc::new(BjjProvider::new(Arc::new(
            InMemoryPrivateKeyStore::new(),
        ))));
        kms
    }

    pub fn register_key_provider(&mut self, provider: Arc<dyn KeyProvider>) {
        self.providers.insert(provider.key_type(), provider);
    }

    fn provider(&self, key_type: KeyType) -> Result<&Arc<dyn KeyProvider>> {
        self.providers
            .get(&key_type)
            .ok_or_else(|| WalletError::Kms(format!("no provider for key type {}", key_type.as_str())))
    }

    pub async fn create_key_from_seed(&self, key_type: KeyType, seed: &[u8]) -> Result<KeyId> {
        self.provider(key_type)?.new_key_from_seed(seed).await
    }

    /// New key from 32 random bytes.
    pub async fn generate_key(&self, key_type: KeyType) -> Result<KeyId> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        self.create_key_from_seed(key_type, &seed).await
    }

    pub async fn public_key(&self, key: &KeyId) -> Result<PublicKey> {
        self.provider(key.key_type)?.public_key(key).await
    }

    pub async fn sign(&self, key: &KeyId, data: &[u8]) -> Result<Vec<u8>> {
        self.provider(key.key_type)?.sign(key, data).await
    }
}
