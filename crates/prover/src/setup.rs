//! Trusted setup utilities for generating proving and verifying keys.

use std::collections::BTreeMap;
use std::path::Path;

use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use identity_circuits::{CircuitId, StateTransitionCircuit};

/// File listing the circuits and tree depth a key directory was built for.
const MANIFEST_FILE: &str = "manifest.json";

/// Errors that can occur during setup
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Circuit setup failed: {0}")]
    CircuitSetup(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys for a single circuit
#[derive(Clone)]
pub struct CircuitKeyPair {
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
}

impl CircuitKeyPair {
    /// Serialize proving key to bytes
    pub fn serialize_pk(&self) -> Result<Vec<u8>, SetupError> {
        let mut bytes = Vec::new();
        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| SetupError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Serialize verifying key to bytes
    pub fn serialize_vk(&self) -> Result<Vec<u8>, SetupError> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| SetupError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize proving key from bytes
    pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, SetupError> {
        ProvingKey::deserialize_compressed(bytes)
            .map_err(|e| SetupError::Deserialization(e.to_string()))
    }

    /// Deserialize verifying key from bytes
    pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, SetupError> {
        VerifyingKey::deserialize_compressed(bytes)
            .map_err(|e| SetupError::Deserialization(e.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    depth: usize,
    circuits: Vec<CircuitId>,
}

/// Keys for every circuit with a native Groth16 backend, built for one
/// claims tree depth.
#[derive(Clone)]
pub struct CircuitKeys {
    depth: usize,
    keys: BTreeMap<&'static str, (CircuitId, CircuitKeyPair)>,
}

impl CircuitKeys {
    /// Run trusted setup for all supported circuits.
    pub fn setup<R: RngCore + CryptoRng>(depth: usize, rng: &mut R) -> Result<Self, SetupError> {
        info!(depth, "Setting up StateTransitionCircuit");
        let state_transition = setup_state_transition(depth, rng)?;

        let mut keys = Self::empty(depth);
        keys.insert(CircuitId::StateTransition, state_transition);
        Ok(keys)
    }

    fn empty(depth: usize) -> Self {
        Self {
            depth,
            keys: BTreeMap::new(),
        }
    }

    fn insert(&mut self, id: CircuitId, pair: CircuitKeyPair) {
        self.keys.insert(id.as_str(), (id, pair));
    }

    /// Claims tree depth the keys were generated for.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn get(&self, id: CircuitId) -> Option<&CircuitKeyPair> {
        self.keys.get(id.as_str()).map(|(_, pair)| pair)
    }

    pub fn circuits(&self) -> impl Iterator<Item = CircuitId> + '_ {
        self.keys.values().map(|(id, _)| *id)
    }

    /// Save all keys to a directory as `<circuitId>.pk` / `<circuitId>.vk`.
    pub fn save_to_directory(&self, dir: &Path) -> Result<(), SetupError> {
        std::fs::create_dir_all(dir)?;

        for (name, (_, pair)) in &self.keys {
            std::fs::write(dir.join(format!("{name}.pk")), pair.serialize_pk()?)?;
            std::fs::write(dir.join(format!("{name}.vk")), pair.serialize_vk()?)?;
        }

        let manifest = Manifest {
            depth: self.depth,
            circuits: self.circuits().collect(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| SetupError::Serialization(e.to_string()))?;
        std::fs::write(dir.join(MANIFEST_FILE), json)?;

        Ok(())
    }

    /// Load all keys listed in the directory's manifest.
    pub fn load_from_directory(dir: &Path) -> Result<Self, SetupError> {
        let manifest: Manifest = serde_json::from_slice(&std::fs::read(dir.join(MANIFEST_FILE))?)
            .map_err(|e| SetupError::Deserialization(e.to_string()))?;

        let mut keys = Self::empty(manifest.depth);
        for id in manifest.circuits {
            let name = id.as_str();
            let pair = CircuitKeyPair {
                proving_key: CircuitKeyPair::deserialize_pk(&std::fs::read(
                    dir.join(format!("{name}.pk")),
                )?)?,
                verifying_key: CircuitKeyPair::deserialize_vk(&std::fs::read(
                    dir.join(format!("{name}.vk")),
                )?)?,
            };
            keys.insert(id, pair);
        }

        Ok(keys)
    }
}

/// Setup StateTransitionCircuit
pub fn setup_state_transition<R: RngCore + CryptoRng>(
    depth: usize,
    rng: &mut R,
) -> Result<CircuitKeyPair, SetupError> {
    let circuit = StateTransitionCircuit::empty(depth);
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
        .map_err(|e| SetupError::CircuitSetup(e.to_string()))?;

    Ok(CircuitKeyPair {
        proving_key: pk,
        verifying_key: vk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    const DEPTH: usize = 8;

    #[test]
    fn test_setup_state_transition() {
        let mut rng = StdRng::seed_from_u64(42);
        let keys = setup_state_transition(DEPTH, &mut rng).unwrap();

        // Verify keys can be serialized and deserialized
        let pk_bytes = keys.serialize_pk().unwrap();
        let vk_bytes = keys.serialize_vk().unwrap();

        let _pk = CircuitKeyPair::deserialize_pk(&pk_bytes).unwrap();
        let vk = CircuitKeyPair::deserialize_vk(&vk_bytes).unwrap();
        assert_eq!(vk, keys.verifying_key);
    }

    #[test]
    fn test_save_and_load_directory() {
        let mut rng = StdRng::seed_from_u64(42);
        let keys = CircuitKeys::setup(DEPTH, &mut rng).unwrap();
        let dir = tempfile::tempdir().unwrap();

        keys.save_to_directory(dir.path()).unwrap();
        assert!(dir.path().join("stateTransition.pk").exists());

        let loaded = CircuitKeys::load_from_directory(dir.path()).unwrap();
        assert_eq!(loaded.depth(), DEPTH);
        assert_eq!(
            loaded.circuits().collect::<Vec<_>>(),
            vec![CircuitId::StateTransition]
        );
        assert_eq!(
            loaded.get(CircuitId::StateTransition).unwrap().verifying_key,
            keys.get(CircuitId::StateTransition).unwrap().verifying_key
        );
        assert!(loaded.get(CircuitId::AuthV2).is_none());
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CircuitKeys::load_from_directory(&dir.path().join("absent")),
            Err(SetupError::Io(_))
        ));
    }
}
