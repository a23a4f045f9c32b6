use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use identity_circuits::Hash;

use super::IdentityStorage;
use crate::error::{Result, WalletError};

/// Publication status of an identity's latest state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Created,
    /// Published, outcome not yet known
    Transacted,
    Confirmed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub identifier: String,
    pub state: Hash,
    pub published: bool,
    pub genesis: bool,
    pub status: IdentityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<Hash>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Identity {
    pub fn genesis(identifier: String, state: Hash) -> Self {
        let now = Utc::now();
        Self {
            identifier,
            state,
            published: false,
            genesis: true,
            status: IdentityStatus::Created,
            tx_id: None,
            previous_state: None,
            created_at: now,
            modified_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub nonce: u64,
    pub genesis_identifier: String,
    pub verifier: String,
}

#[derive(Default)]
pub struct InMemoryIdentityStorage {
    identities: RwLock<HashMap<String, Identity>>,
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryIdentityStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStorage for InMemoryIdentityStorage {
    async fn save_identity(&self, identity: Identity) -> Result<()> {
        self.identities
            .write()
            .await
            .insert(identity.identifier.clone(), identity);
        Ok(())
    }

    async fn get_identity(&self, identifier: &str) -> Result<Option<Identity>> {
        Ok(self.identities.read().await.get(identifier).cloned())
    }

    async fn save_profile(&self, profile: Profile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&profile.id) {
            return Err(WalletError::Conflict(format!("profile {} already exists", profile.id)));
        }
        profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn get_profiles_by_genesis_identifier(&self, genesis: &str) -> Result<Vec<Profile>> {
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .filter(|p| p.genesis_identifier == genesis)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, genesis: &str, nonce: u64) -> Profile {
        Profile {
            id: id.into(),
            nonce,
            genesis_identifier: genesis.into(),
            verifier: format!("verifier-{nonce}"),
        }
    }

    #[tokio::test]
    async fn test_profiles_filtered_by_genesis() {
        let storage = InMemoryIdentityStorage::new();
        storage.save_profile(profile("p1", "g1", 1)).await.unwrap();
        storage.save_profile(profile("p2", "g1", 2)).await.unwrap();
        storage.save_profile(profile("p3", "g2", 1)).await.unwrap();

        let mut found = storage.get_profiles_by_genesis_identifier("g1").await.unwrap();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "p1");

        assert!(storage.save_profile(profile("p1", "g1", 9)).await.is_err());
    }

    #[tokio::test]
    async fn test_identity_status_serializes_lowercase() {
        let identity = Identity::genesis("did:x".into(), Hash::zero());
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["status"], "created");
        assert!(json.get("txId").is_none());
    }
}
