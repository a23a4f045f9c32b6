//! Parameters a message packer needs from the wallet.

use serde::{Deserialize, Serialize};

use identity_circuits::{CircuitId, Did};

use crate::error::{Result, WalletError};

pub const GROTH16_ALG: &str = "groth16";
pub const ES256K: &str = "ES256K";
pub const ES256K_R: &str = "ES256K-R";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvingMethod {
    pub alg: String,
    pub circuit_id: CircuitId,
}

/// Per-media-type packer parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackerParams {
    #[serde(rename_all = "camelCase")]
    Zkp {
        sender_did: Did,
        #[serde(default)]
        profile_nonce: u64,
        proving_method: ProvingMethod,
    },
    Jws {
        alg: String,
        did: Did,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kid: Option<String>,
    },
    Plain,
}

impl PackerParams {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Zkp { proving_method, .. } => {
                if proving_method.alg != GROTH16_ALG {
                    return Err(WalletError::Validation(format!(
                        "unsupported proving algorithm {}",
                        proving_method.alg
                    )));
                }
                if proving_method.circuit_id != CircuitId::AuthV2 {
                    return Err(WalletError::Validation(format!(
                        "zkp packing requires {}, got {}",
                        CircuitId::AuthV2,
                        proving_method.circuit_id
                    )));
                }
                Ok(())
            }
            Self::Jws { alg, .. } => match alg.as_str() {
                ES256K | ES256K_R => Ok(()),
                other => Err(WalletError::Validation(format!("unsupported JWS alg {other}"))),
            },
            Self::Plain => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use identity_circuits::{DidType, Id};
    use serde_json::json;

    fn did() -> Did {
        Did::from_id(Id::genesis_from_state(DidType::IDEN3_POLYGON_MUMBAI, Fr::from(9u64))).unwrap()
    }

    #[test]
    fn test_zkp_params() {
        let params: PackerParams = serde_json::from_value(json!({
            "type": "zkp",
            "senderDid": did().to_string(),
            "profileNonce": 0,
            "provingMethod": {"alg": "groth16", "circuitId": "authV2"}
        }))
        .unwrap();
        params.validate().unwrap();

        let PackerParams::Zkp { proving_method, .. } = params else {
            panic!("expected zkp params");
        };
        let wrong = PackerParams::Zkp {
            sender_did: did(),
            profile_nonce: 0,
            proving_method: ProvingMethod {
                circuit_id: CircuitId::StateTransition,
                ..proving_method
            },
        };
        assert!(matches!(wrong.validate(), Err(WalletError::Validation(_))));
    }

    #[test]
    fn test_jws_alg_checked() {
        let did = did();
        for (alg, ok) in [("ES256K", true), ("ES256K-R", true), ("RS256", false)] {
            let params = PackerParams::Jws {
                alg: alg.into(),
                did,
                kid: None,
            };
            assert_eq!(params.validate().is_ok(), ok, "{alg}");
        }
        assert!(PackerParams::Plain.validate().is_ok());
    }
}
