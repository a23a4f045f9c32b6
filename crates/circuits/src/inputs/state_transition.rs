//! Inputs of the StateTransition circuit: moves an identity from an old
//! state to a new one under a signature of `Hash(oldState, newState)`.

use serde_json::Map;

use super::{
    bool_signal, insert_exclusion_proof, insert_tree_state, list_signal, prepare_siblings,
    str_signal, to_bytes, CLAIM_LEVELS,
};
use crate::babyjub::Signature;
use crate::claim::CoreClaim;
use crate::encoding::fr_to_decimal;
use crate::error::CircuitError;
use crate::id::Id;
use crate::smt::Proof;
use crate::tree_state::TreeState;

#[derive(Clone, Debug)]
pub struct StateTransitionInputs {
    pub id: Id,
    pub old_tree_state: TreeState,
    pub new_tree_state: TreeState,
    pub is_old_state_genesis: bool,
    pub auth_claim: CoreClaim,
    /// Auth claim inclusion in the old claims tree
    pub auth_claim_inc_mtp: Proof,
    /// Auth claim exclusion from the old revocation tree
    pub auth_claim_non_rev_mtp: Proof,
    /// Auth claim inclusion in the new claims tree
    pub auth_claim_new_state_inc_mtp: Proof,
    pub signature: Signature,
}

impl StateTransitionInputs {
    pub fn inputs_marshal(&self) -> Result<Vec<u8>, CircuitError> {
        self.old_tree_state.validate()?;
        self.new_tree_state.validate()?;

        let mut m = Map::new();
        m.insert("authClaim".into(), list_signal(self.auth_claim.marshal_slots()));
        m.insert(
            "authClaimMtp".into(),
            list_signal(prepare_siblings(&self.auth_claim_inc_mtp, CLAIM_LEVELS)?),
        );
        insert_exclusion_proof(&mut m, "authClaimNonRevMtp", &self.auth_claim_non_rev_mtp, CLAIM_LEVELS)?;
        m.insert(
            "newAuthClaimMtp".into(),
            list_signal(prepare_siblings(&self.auth_claim_new_state_inc_mtp, CLAIM_LEVELS)?),
        );

        m.insert("userID".into(), str_signal(fr_to_decimal(&self.id.to_fr())));
        m.insert("isOldStateGenesis".into(), bool_signal(self.is_old_state_genesis));
        insert_tree_state(
            &mut m,
            &self.old_tree_state,
            ["claimsTreeRoot", "revTreeRoot", "rootsTreeRoot", "oldUserState"],
        );
        insert_tree_state(
            &mut m,
            &self.new_tree_state,
            ["newClaimsTreeRoot", "newRevTreeRoot", "newRootsTreeRoot", "newUserState"],
        );

        let (r8x, r8y, s) = self.signature.marshal();
        m.insert("signatureR8x".into(), str_signal(r8x));
        m.insert("signatureR8y".into(), str_signal(r8y));
        m.insert("signatureS".into(), str_signal(s));

        to_bytes(m)
    }
}
