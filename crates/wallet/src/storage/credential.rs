use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CredentialStorage;
use crate::credential::W3CCredential;
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryCredentialStorage {
    credentials: RwLock<BTreeMap<String, W3CCredential>>,
}

impl InMemoryCredentialStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStorage for InMemoryCredentialStorage {
    async fn save_credential(&self, credential: W3CCredential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn get_credential(&self, id: &str) -> Result<Option<W3CCredential>> {
        Ok(self.credentials.read().await.get(id).cloned())
    }

    async fn list_credentials(&self) -> Result<Vec<W3CCredential>> {
        Ok(self.credentials.read().await.values().cloned().collect())
    }
}
