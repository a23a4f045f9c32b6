//! Inputs of the AuthV2 circuit: proves control of an identity and signs a
//! challenge, anchored to the global identity state tree.

use ark_bn254::Fr;
use serde_json::Map;

use super::{
    insert_exclusion_proof, insert_tree_state, list_signal, prepare_siblings, str_signal,
    to_bytes, GistProof, CLAIM_LEVELS, GIST_LEVELS,
};
use crate::babyjub::Signature;
use crate::claim::CoreClaim;
use crate::encoding::fr_to_decimal;
use crate::error::CircuitError;
use crate::id::Id;
use crate::smt::Proof;
use crate::tree_state::TreeState;

#[derive(Clone, Debug)]
pub struct AuthV2Inputs {
    pub genesis_id: Id,
    pub profile_nonce: Fr,
    pub auth_claim: CoreClaim,
    pub auth_claim_inc_mtp: Proof,
    pub auth_claim_non_rev_mtp: Proof,
    pub tree_state: TreeState,
    pub gist_proof: GistProof,
    pub signature: Signature,
    pub challenge: Fr,
}

impl AuthV2Inputs {
    pub fn inputs_marshal(&self) -> Result<Vec<u8>, CircuitError> {
        if !self.auth_claim_inc_mtp.existence {
            return Err(CircuitError::Marshal("auth claim is not in the claims tree".into()));
        }
        let mut m = Map::new();
        m.insert("genesisID".into(), str_signal(fr_to_decimal(&self.genesis_id.to_fr())));
        m.insert("profileNonce".into(), str_signal(fr_to_decimal(&self.profile_nonce)));
        m.insert("authClaim".into(), list_signal(self.auth_claim.marshal_slots()));
        m.insert(
            "authClaimIncMtp".into(),
            list_signal(prepare_siblings(&self.auth_claim_inc_mtp, CLAIM_LEVELS)?),
        );
        insert_exclusion_proof(&mut m, "authClaimNonRevMtp", &self.auth_claim_non_rev_mtp, CLAIM_LEVELS)?;

        m.insert("challenge".into(), str_signal(fr_to_decimal(&self.challenge)));
        let (r8x, r8y, s) = self.signature.marshal();
        m.insert("challengeSignatureR8x".into(), str_signal(r8x));
        m.insert("challengeSignatureR8y".into(), str_signal(r8y));
        m.insert("challengeSignatureS".into(), str_signal(s));

        insert_tree_state(
            &mut m,
            &self.tree_state,
            ["claimsTreeRoot", "revTreeRoot", "rootsTreeRoot", "state"],
        );

        m.insert("gistRoot".into(), str_signal(self.gist_proof.root.to_decimal()));
        insert_exclusion_proof(&mut m, "gistMtp", &self.gist_proof.proof, GIST_LEVELS)?;

        to_bytes(m)
    }
}
