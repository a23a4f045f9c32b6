//! Circuit input structures and their JSON marshaling.
//!
//! Each input struct marshals to a JSON object of decimal strings keyed by the
//! circuit's signal names. Sibling arrays are zero-padded to the circuit's
//! fixed level count.

mod atomic_query_mtp;
mod atomic_query_sig;
mod auth_v2;
mod state_transition;

pub use atomic_query_mtp::AtomicQueryMtpV2Inputs;
pub use atomic_query_sig::AtomicQuerySigV2Inputs;
pub use auth_v2::AuthV2Inputs;
pub use state_transition::StateTransitionInputs;

use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::babyjub::Signature;
use crate::claim::CoreClaim;
use crate::encoding::fr_to_decimal;
use crate::error::CircuitError;
use crate::hash::Hash;
use crate::id::Id;
use crate::query::CircuitQuery;
use crate::smt::Proof;
use crate::tree_state::TreeState;

/// Levels of identity trees as seen by circuits.
pub const CLAIM_LEVELS: usize = 40;
/// Levels of the global identity state tree.
pub const GIST_LEVELS: usize = 64;
/// Levels of a merklized credential document tree.
pub const CLAIM_PATH_LEVELS: usize = 32;

/// A proof together with the tree state it was generated against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleTreeProofWithTreeState {
    pub proof: Proof,
    pub tree_state: TreeState,
}

/// Proof of an identity's entry in the global identity state tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistProof {
    pub root: Hash,
    pub proof: Proof,
}

/// Issuer signature over a claim plus the issuer auth-claim proofs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BjjSignatureProof {
    pub signature: Signature,
    pub issuer_auth_claim: CoreClaim,
    pub issuer_auth_inc_proof: MerkleTreeProofWithTreeState,
    pub issuer_auth_non_rev_proof: MerkleTreeProofWithTreeState,
}

/// A credential's claim with the evidence a query circuit needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitClaim {
    pub issuer_id: Id,
    pub claim: CoreClaim,
    pub inc_proof: Option<MerkleTreeProofWithTreeState>,
    pub non_rev_proof: MerkleTreeProofWithTreeState,
    pub signature_proof: Option<BjjSignatureProof>,
}

/// Sibling list as decimal strings, zero-padded to `levels`.
pub(crate) fn prepare_siblings(proof: &Proof, levels: usize) -> Result<Vec<String>, CircuitError> {
    if proof.siblings.len() > levels {
        return Err(CircuitError::Marshal(format!(
            "proof has {} levels, circuit supports {levels}",
            proof.siblings.len()
        )));
    }
    let mut out: Vec<String> = proof.siblings.iter().map(|h| h.to_decimal()).collect();
    out.resize(levels, "0".to_string());
    Ok(out)
}

/// Auxiliary node signals `(auxHi, auxHv, noAux)` of an exclusion proof.
pub(crate) fn aux_signals(proof: &Proof) -> (String, String, String) {
    match (&proof.node_aux, proof.existence) {
        (Some(aux), false) => (aux.key.to_decimal(), aux.value.to_decimal(), "0".into()),
        (None, false) => ("0".into(), "0".into(), "1".into()),
        _ => ("0".into(), "0".into(), "0".into()),
    }
}

pub(crate) fn bool_signal(b: bool) -> Value {
    Value::String(if b { "1" } else { "0" }.to_string())
}

pub(crate) fn str_signal(s: String) -> Value {
    Value::String(s)
}

pub(crate) fn list_signal(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

/// Insert `<prefix>`, `<prefix>AuxHi`, `<prefix>AuxHv` and `<prefix>NoAux`.
pub(crate) fn insert_exclusion_proof(
    map: &mut Map<String, Value>,
    prefix: &str,
    proof: &Proof,
    levels: usize,
) -> Result<(), CircuitError> {
    map.insert(prefix.to_string(), list_signal(prepare_siblings(proof, levels)?));
    let (hi, hv, no_aux) = aux_signals(proof);
    map.insert(format!("{prefix}AuxHi"), str_signal(hi));
    map.insert(format!("{prefix}AuxHv"), str_signal(hv));
    map.insert(format!("{prefix}NoAux"), str_signal(no_aux));
    Ok(())
}

/// Insert the four roots of a tree state under the given signal names.
pub(crate) fn insert_tree_state(
    map: &mut Map<String, Value>,
    tree_state: &TreeState,
    names: [&str; 4],
) {
    let [claims, rev, roots, state] = names;
    map.insert(claims.into(), str_signal(tree_state.claims_root.to_decimal()));
    map.insert(rev.into(), str_signal(tree_state.revocation_root.to_decimal()));
    map.insert(roots.into(), str_signal(tree_state.root_of_roots.to_decimal()));
    map.insert(state.into(), str_signal(tree_state.state.to_decimal()));
}

/// Query signals shared by the atomic query circuits.
pub(crate) fn insert_query(map: &mut Map<String, Value>, query: &CircuitQuery) -> Result<(), CircuitError> {
    match &query.value_proof {
        Some(vp) => {
            map.insert("claimPathNotExists".into(), bool_signal(!vp.mtp.existence));
            map.insert(
                "claimPathMtp".into(),
                list_signal(prepare_siblings(&vp.mtp, CLAIM_PATH_LEVELS)?),
            );
            let (hi, hv, no_aux) = aux_signals(&vp.mtp);
            map.insert("claimPathMtpNoAux".into(), str_signal(no_aux));
            map.insert("claimPathMtpAuxHi".into(), str_signal(hi));
            map.insert("claimPathMtpAuxHv".into(), str_signal(hv));
            map.insert("claimPathKey".into(), str_signal(fr_to_decimal(&vp.path)));
            map.insert("claimPathValue".into(), str_signal(fr_to_decimal(&vp.value)));
            map.insert("merklized".into(), bool_signal(true));
        }
        None => {
            let zero = fr_to_decimal(&ark_bn254::Fr::zero());
            map.insert("claimPathNotExists".into(), bool_signal(false));
            map.insert("claimPathMtp".into(), list_signal(vec![zero.clone(); CLAIM_PATH_LEVELS]));
            map.insert("claimPathMtpNoAux".into(), str_signal(zero.clone()));
            map.insert("claimPathMtpAuxHi".into(), str_signal(zero.clone()));
            map.insert("claimPathMtpAuxHv".into(), str_signal(zero.clone()));
            map.insert("claimPathKey".into(), str_signal(zero.clone()));
            map.insert("claimPathValue".into(), str_signal(zero));
            map.insert("merklized".into(), bool_signal(false));
        }
    }
    map.insert("operator".into(), str_signal(query.operator.code().to_string()));
    map.insert("slotIndex".into(), str_signal(query.slot_index.to_string()));
    map.insert("value".into(), list_signal(query.marshal_values()));
    Ok(())
}

pub(crate) fn to_bytes(map: Map<String, Value>) -> Result<Vec<u8>, CircuitError> {
    serde_json::to_vec(&Value::Object(map)).map_err(|e| CircuitError::Marshal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::NodeAux;
    use ark_bn254::Fr;

    #[test]
    fn test_siblings_are_padded() {
        let proof = Proof::existence(vec![Hash(Fr::from(3u64)); 4]);
        let siblings = prepare_siblings(&proof, CLAIM_LEVELS).unwrap();
        assert_eq!(siblings.len(), CLAIM_LEVELS);
        assert_eq!(siblings[0], "3");
        assert_eq!(siblings[4], "0");
        assert!(prepare_siblings(&proof, 2).is_err());
    }

    #[test]
    fn test_aux_signals() {
        let empty = Proof::non_existence(vec![], None);
        assert_eq!(aux_signals(&empty), ("0".into(), "0".into(), "1".into()));

        let aux = NodeAux {
            key: Hash(Fr::from(5u64)),
            value: Hash(Fr::from(6u64)),
        };
        let with_aux = Proof::non_existence(vec![], Some(aux));
        assert_eq!(aux_signals(&with_aux), ("5".into(), "6".into(), "0".into()));

        let incl = Proof::existence(vec![]);
        assert_eq!(aux_signals(&incl), ("0".into(), "0".into(), "0".into()));
    }
}
