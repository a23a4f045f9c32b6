//! Inputs of the credentialAtomicQueryMTPV2 circuit: a query over a claim
//! proven by inclusion in the issuer's claims tree.

use ark_bn254::Fr;
use serde_json::Map;

use super::{
    bool_signal, insert_exclusion_proof, insert_query, insert_tree_state, list_signal,
    prepare_siblings, str_signal, to_bytes, CircuitClaim, CLAIM_LEVELS,
};
use crate::encoding::fr_to_decimal;
use crate::error::CircuitError;
use crate::id::Id;
use crate::query::CircuitQuery;

#[derive(Clone, Debug)]
pub struct AtomicQueryMtpV2Inputs {
    pub request_id: Fr,
    pub id: Id,
    pub profile_nonce: Fr,
    pub claim_subject_profile_nonce: Fr,
    pub claim: CircuitClaim,
    pub skip_claim_revocation_check: bool,
    pub query: CircuitQuery,
    pub current_timestamp: i64,
}

impl AtomicQueryMtpV2Inputs {
    pub fn inputs_marshal(&self) -> Result<Vec<u8>, CircuitError> {
        let inc = self
            .claim
            .inc_proof
            .as_ref()
            .ok_or_else(|| CircuitError::Marshal("claim inclusion proof is required".into()))?;
        let non_rev = &self.claim.non_rev_proof;

        let mut m = Map::new();
        m.insert("requestID".into(), str_signal(fr_to_decimal(&self.request_id)));
        m.insert("userGenesisID".into(), str_signal(fr_to_decimal(&self.id.to_fr())));
        m.insert("profileNonce".into(), str_signal(fr_to_decimal(&self.profile_nonce)));
        m.insert(
            "claimSubjectProfileNonce".into(),
            str_signal(fr_to_decimal(&self.claim_subject_profile_nonce)),
        );
        m.insert("issuerID".into(), str_signal(fr_to_decimal(&self.claim.issuer_id.to_fr())));
        m.insert("issuerClaim".into(), list_signal(self.claim.claim.marshal_slots()));
        m.insert(
            "issuerClaimMtp".into(),
            list_signal(prepare_siblings(&inc.proof, CLAIM_LEVELS)?),
        );
        insert_tree_state(
            &mut m,
            &inc.tree_state,
            [
                "issuerClaimClaimsTreeRoot",
                "issuerClaimRevTreeRoot",
                "issuerClaimRootsTreeRoot",
                "issuerClaimIdenState",
            ],
        );

        insert_exclusion_proof(&mut m, "issuerClaimNonRevMtp", &non_rev.proof, CLAIM_LEVELS)?;
        insert_tree_state(
            &mut m,
            &non_rev.tree_state,
            [
                "issuerClaimNonRevClaimsTreeRoot",
                "issuerClaimNonRevRevTreeRoot",
                "issuerClaimNonRevRootsTreeRoot",
                "issuerClaimNonRevState",
            ],
        );
        m.insert(
            "isRevocationChecked".into(),
            bool_signal(!self.skip_claim_revocation_check),
        );

        m.insert(
            "claimSchema".into(),
            str_signal(fr_to_decimal(&self.claim.claim.schema_hash().to_fr())),
        );
        insert_query(&mut m, &self.query)?;
        m.insert("timestamp".into(), str_signal(self.current_timestamp.to_string()));

        to_bytes(m)
    }
}
