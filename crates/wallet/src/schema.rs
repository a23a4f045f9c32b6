//! Credential schemas: loading, serialization slots and schema hashes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use identity_circuits::SchemaHash;

use crate::credential::{AUTH_BJJ_CONTEXT_URL, AUTH_BJJ_CREDENTIAL_TYPE, AUTH_BJJ_SCHEMA_URL};
use crate::error::{Result, WalletError};

/// Fetches JSON schemas and JSON-LD contexts by URL.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Value>;
}

/// Loader over documents registered up front. Knows the auth credential
/// schema and context out of the box.
pub struct StaticSchemaLoader {
    documents: RwLock<HashMap<String, Value>>,
}

impl Default for StaticSchemaLoader {
    fn default() -> Self {
        let mut documents = HashMap::new();
        documents.insert(AUTH_BJJ_SCHEMA_URL.to_string(), auth_json_schema());
        documents.insert(AUTH_BJJ_CONTEXT_URL.to_string(), auth_jsonld_context());
        Self {
            documents: RwLock::new(documents),
        }
    }
}

impl StaticSchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, url: impl Into<String>, document: Value) {
        self.documents.write().await.insert(url.into(), document);
    }
}

#[async_trait]
impl SchemaLoader for StaticSchemaLoader {
    async fn load(&self, url: &str) -> Result<Value> {
        self.documents
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(format!("schema {url} is not known")))
    }
}

/// Flattened claim slot a serialization entry maps to.
fn slot_of(entry: &str) -> Option<usize> {
    match entry {
        "indexDataSlotA" => Some(2),
        "indexDataSlotB" => Some(3),
        "valueDataSlotA" => Some(6),
        "valueDataSlotB" => Some(7),
        _ => None,
    }
}

fn metadata(schema: &Value) -> Result<&Value> {
    schema
        .get("$metadata")
        .ok_or_else(|| WalletError::Validation("schema has no $metadata".into()))
}

/// `(field, slot)` pairs from `$metadata.serialization`.
pub fn serialization_slots(schema: &Value) -> Result<Vec<(String, usize)>> {
    let Some(serialization) = metadata(schema)?.get("serialization") else {
        return Ok(Vec::new());
    };
    let entries = serialization
        .as_object()
        .ok_or_else(|| WalletError::Validation("schema serialization must be an object".into()))?;

    entries
        .iter()
        .map(|(entry, field)| {
            let slot = slot_of(entry).ok_or_else(|| {
                WalletError::Validation(format!("unknown serialization entry {entry}"))
            })?;
            let field = field.as_str().ok_or_else(|| {
                WalletError::Validation(format!("serialization entry {entry} must name a field"))
            })?;
            Ok((field.to_string(), slot))
        })
        .collect()
}

/// Claim slot holding `field` in a non-merklized credential.
pub fn field_slot_index(field: &str, schema: &Value) -> Result<usize> {
    serialization_slots(schema)?
        .into_iter()
        .find(|(f, _)| f == field)
        .map(|(_, slot)| slot)
        .ok_or_else(|| {
            WalletError::Validation(format!("field {field} is not in the schema serialization"))
        })
}

/// `$metadata.uris.jsonLdContext` of a JSON schema.
pub fn context_url(schema: &Value) -> Result<&str> {
    metadata(schema)?
        .pointer("/uris/jsonLdContext")
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::Validation("schema has no JSON-LD context url".into()))
}

/// Schema hash of a credential type: the first 16 bytes of
/// `SHA-256("<context url>#<type>")`.
pub fn schema_hash(context_url: &str, credential_type: &str) -> SchemaHash {
    if context_url == AUTH_BJJ_CONTEXT_URL && credential_type == AUTH_BJJ_CREDENTIAL_TYPE {
        return SchemaHash::AUTH_BJJ;
    }
    let digest = Sha256::digest(format!("{context_url}#{credential_type}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    SchemaHash(bytes)
}

fn auth_json_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "$metadata": {
            "uris": {"jsonLdContext": AUTH_BJJ_CONTEXT_URL},
            "serialization": {"indexDataSlotA": "x", "indexDataSlotB": "y"}
        },
        "type": "object",
        "required": ["credentialSubject"],
        "properties": {
            "credentialSubject": {
                "type": "object",
                "required": ["x", "y"],
                "properties": {
                    "x": {"type": "string"},
                    "y": {"type": "string"}
                }
            }
        }
    })
}

fn auth_jsonld_context() -> Value {
    json!({
        "@context": [{
            "@version": 1.1,
            "@protected": true,
            "id": "@id",
            "type": "@type",
            AUTH_BJJ_CREDENTIAL_TYPE: {
                "@id": "https://schema.iden3.io/core/jsonld/auth.jsonld#AuthBJJCredential",
                "@context": {
                    "iden3-auth-vocab": "https://schema.iden3.io/core/vocab/auth.md#",
                    "x": {"@id": "iden3-auth-vocab:x", "@type": "xsd:positiveInteger"},
                    "y": {"@id": "iden3-auth-vocab:y", "@type": "xsd:positiveInteger"}
                }
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auth_schema_slots() {
        let loader = StaticSchemaLoader::new();
        let schema = loader.load(AUTH_BJJ_SCHEMA_URL).await.unwrap();
        assert_eq!(field_slot_index("x", &schema).unwrap(), 2);
        assert_eq!(field_slot_index("y", &schema).unwrap(), 3);
        assert!(matches!(
            field_slot_index("z", &schema),
            Err(WalletError::Validation(_))
        ));
        assert_eq!(context_url(&schema).unwrap(), AUTH_BJJ_CONTEXT_URL);
        assert_eq!(
            schema_hash(AUTH_BJJ_CONTEXT_URL, AUTH_BJJ_CREDENTIAL_TYPE),
            SchemaHash::AUTH_BJJ
        );
    }

    #[tokio::test]
    async fn test_unknown_schema() {
        let loader = StaticSchemaLoader::new();
        assert!(matches!(
            loader.load("https://example.com/none.json").await,
            Err(WalletError::NotFound(_))
        ));
    }

    #[test]
    fn test_schema_hash_depends_on_type() {
        let a = schema_hash("https://example.com/kyc.jsonld", "KYCAgeCredential");
        let b = schema_hash("https://example.com/kyc.jsonld", "KYCCountryCredential");
        assert_ne!(a, b);
    }

    #[test]
    fn test_value_slots() {
        let schema = json!({"$metadata": {"serialization": {"valueDataSlotB": "age"}}});
        assert_eq!(field_slot_index("age", &schema).unwrap(), 7);
        let bad = json!({"$metadata": {"serialization": {"slot9": "age"}}});
        assert!(serialization_slots(&bad).is_err());
    }
}
