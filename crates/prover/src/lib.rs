//! Groth16 proving for identity circuits.
//!
//! This crate provides utilities for:
//! - Trusted setup (generating, saving and loading proving/verifying keys)
//! - The `Prover` seam used by the wallet, with a Groth16 implementation
//! - snarkjs-shaped proofs (`ZkProof`) and their verification

pub mod proof;
pub mod prove;
pub mod setup;
pub mod verify;

pub use proof::{ProofData, ZkProof};
pub use prove::{Groth16Prover, Prover, ProverError};
pub use setup::{setup_state_transition, CircuitKeyPair, CircuitKeys, SetupError};
pub use verify::verify_zk_proof;

use ark_bn254::Fr;

/// Common field type for all operations
pub type ConstraintF = Fr;
