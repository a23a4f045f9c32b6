//! Identity wallet and zero-knowledge proof orchestration.
//!
//! This crate provides:
//! - `IdentityWallet`: identities, profiles, claims and their Merkle proofs
//! - `CredentialWallet`: credential lookup and revocation status
//! - `QueryTranslator`: verifier queries to circuit queries
//! - `ProofService`: query proofs, AuthV2 inputs, state verification and
//!   state transitions
//! - Storage and key management seams with in-memory implementations

pub mod config;
pub mod credential;
pub mod credential_wallet;
pub mod error;
pub mod identity;
pub mod kms;
pub mod locks;
pub mod merklize;
pub mod packer;
pub mod presentation;
pub mod proof_service;
pub mod protocol;
pub mod query;
pub mod schema;
pub mod storage;


pub use config::WalletConfig;
pub use credential::{CredentialRequest, RevocationStatus, W3CCredential};
pub use credential_wallet::{CredentialWallet, LocalCredentialWallet, LocalRevocationResolver};
pub use error::{ErrorKind, Result, WalletError};
pub use identity::IdentityWallet;
pub use kms::{KeyId, KeyType, Kms};
pub use packer::PackerParams;
pub use proof_service::{AuthDataPreparer, ProofGenerationOptions, ProofService, StateVerifier};
pub use protocol::{ZeroKnowledgeProofRequest, ZeroKnowledgeProofResponse};
pub use query::{ProofQuery, QueryTranslator};
pub use schema::{SchemaLoader, StaticSchemaLoader};
pub use storage::DataStorage;
