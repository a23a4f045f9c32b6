//! Proof request and response messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use identity_circuits::CircuitId;
use identity_prover::ZkProof;

use crate::error::{Result, WalletError};
use crate::query::ProofQuery;

/// A verifier's request for one proof.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroKnowledgeProofRequest {
    pub id: u64,
    /// Kept as text so unknown circuits surface as validation errors
    pub circuit_id: String,
    #[serde(default)]
    pub query: ProofQuery,
}

impl ZeroKnowledgeProofRequest {
    pub fn circuit(&self) -> Result<CircuitId> {
        self.circuit_id
            .parse()
            .map_err(|_| WalletError::Validation(format!("unknown circuit {}", self.circuit_id)))
    }
}

/// The proof answering a [`ZeroKnowledgeProofRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroKnowledgeProofResponse {
    pub id: u64,
    pub circuit_id: CircuitId,
    #[serde(flatten)]
    pub proof: ZkProof,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vp: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parsing() {
        let request: ZeroKnowledgeProofRequest = serde_json::from_value(json!({
            "id": 1,
            "circuitId": "credentialAtomicQueryMTPV2",
            "query": {
                "context": "https://example.com/kyc.jsonld",
                "type": "KYCAgeCredential",
                "credentialSubject": {"birthday": {"$lt": 20000101}}
            }
        }))
        .unwrap();
        assert_eq!(request.circuit().unwrap(), CircuitId::AtomicQueryMtpV2);
        assert_eq!(request.query.credential_type, "KYCAgeCredential");

        let unknown = ZeroKnowledgeProofRequest {
            circuit_id: "linkedMultiQuery10".into(),
            ..request
        };
        assert!(matches!(unknown.circuit(), Err(WalletError::Validation(_))));
    }

    #[test]
    fn test_response_flattens_proof() {
        let response = ZeroKnowledgeProofResponse {
            id: 7,
            circuit_id: CircuitId::AtomicQuerySigV2,
            proof: ZkProof {
                proof: identity_prover::ProofData {
                    pi_a: vec!["1".into(), "2".into(), "1".into()],
                    pi_b: vec![],
                    pi_c: vec![],
                    protocol: "groth16".into(),
                    curve: "bn128".into(),
                },
                pub_signals: vec!["5".into()],
            },
            vp: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["circuitId"], "credentialAtomicQuerySigV2");
        assert_eq!(value["proof"]["protocol"], "groth16");
        assert_eq!(value["pub_signals"][0], "5");
        assert!(value.get("vp").is_none());
    }
}
