//! Translation of verifier queries into circuit queries.
//!
//! A verifier asks about at most one field of `credentialSubject`:
//!
//! ```json
//! {"birthday": {"$lt": 20000101}}   // predicate
//! {"birthday": {}}                  // selective disclosure
//! ```
//!
//! Predicates become zero-padded circuit queries. Selective disclosure is
//! rewritten to `$eq` against the field's own value and yields a
//! verifiable presentation of it.

use std::sync::Arc;

use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use identity_circuits::{CircuitQuery, CoreClaim, MerklizedRootPosition, Operator, ValueProof};

use crate::credential::W3CCredential;
use crate::error::{Result, WalletError};
use crate::merklize::{subject_path, MerklizedDocument, MtValue, Path, PathPart, CREDENTIAL_SUBJECT_IRI};
use crate::presentation::create_verifiable_presentation;
use crate::schema::{field_slot_index, SchemaLoader};

/// Declarative query of a proof request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofQuery {
    /// JSON-LD context URL of the credential type
    #[serde(default)]
    pub context: String,
    #[serde(rename = "type", default)]
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_claim_revocation_check: Option<bool>,
}

/// A parsed query and the field it is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryWithFieldName {
    pub query: CircuitQuery,
    /// Empty for `$noop` queries without a field
    pub field_name: String,
    pub is_selective_disclosure: bool,
}

/// Parse the `credentialSubject` part of a query.
pub fn parse_request(subject: Option<&Map<String, Value>>) -> Result<QueryWithFieldName> {
    let Some(subject) = subject.filter(|s| !s.is_empty()) else {
        return Ok(QueryWithFieldName {
            query: CircuitQuery::noop(),
            field_name: String::new(),
            is_selective_disclosure: false,
        });
    };
    if subject.len() > 1 {
        return Err(WalletError::Validation(
            "multiple fields in one query are not supported".into(),
        ));
    }
    let Some((field, predicate)) = subject.iter().next() else {
        return Err(WalletError::Validation("empty credential subject".into()));
    };
    let predicate = predicate.as_object().ok_or_else(|| {
        WalletError::Validation(format!("predicate of {field} must be an object"))
    })?;

    let mut operators = predicate.iter();
    let query = match (operators.next(), operators.next()) {
        (None, _) => {
            return Ok(QueryWithFieldName {
                query: CircuitQuery::noop(),
                field_name: field.clone(),
                is_selective_disclosure: true,
            })
        }
        (Some((name, value)), None) => {
            let operator = Operator::from_name(name)
                .map_err(|e| WalletError::Validation(e.to_string()))?;
            let values = query_values(operator, value)?;
            CircuitQuery::new(operator, values)
                .map_err(|e| WalletError::Validation(e.to_string()))?
        }
        (Some(_), Some(_)) => {
            return Err(WalletError::Validation(format!(
                "multiple predicates for field {field} are not supported"
            )))
        }
    };

    Ok(QueryWithFieldName {
        query,
        field_name: field.clone(),
        is_selective_disclosure: false,
    })
}

fn query_values(operator: Operator, value: &Value) -> Result<Vec<Fr>> {
    match (operator.takes_set(), value) {
        (true, Value::Array(items)) => items
            .iter()
            .map(|v| Ok(MtValue::from_json(v)?.mt_entry()))
            .collect(),
        (true, _) => Err(WalletError::Validation(format!(
            "operator {operator} takes an array of values"
        ))),
        (false, Value::Array(_)) => Err(WalletError::Validation(format!(
            "operator {operator} takes a single value"
        ))),
        (false, v) => Ok(vec![MtValue::from_json(v)?.mt_entry()]),
    }
}

/// Raw JSON value at a dotted field of a credential subject.
fn subject_value<'a>(subject: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut segments = field.split('.');
    let mut current = subject.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn disclosed_value(credential: &W3CCredential, field: &str) -> Result<MtValue> {
    let raw = subject_value(&credential.credential_subject, field).ok_or_else(|| {
        WalletError::Validation(format!("field {field} is not in the credential subject"))
    })?;
    MtValue::from_json(raw)
}

pub struct QueryTranslator {
    schemas: Arc<dyn SchemaLoader>,
}

impl QueryTranslator {
    pub fn new(schemas: Arc<dyn SchemaLoader>) -> Self {
        Self { schemas }
    }

    /// Circuit query for `query` over `credential`, plus the presentation of
    /// the disclosed value for selective disclosure.
    pub async fn to_circuits_query(
        &self,
        query: &ProofQuery,
        credential: &W3CCredential,
        core_claim: &CoreClaim,
    ) -> Result<(CircuitQuery, Option<Value>)> {
        let parsed = parse_request(query.credential_subject.as_ref())?;
        match core_claim.merklized_root_position()? {
            MerklizedRootPosition::None => self.non_merklized(query, parsed, credential).await,
            position => {
                self.merklized(query, parsed, credential, core_claim, position)
                    .await
            }
        }
    }

    async fn non_merklized(
        &self,
        query: &ProofQuery,
        parsed: QueryWithFieldName,
        credential: &W3CCredential,
    ) -> Result<(CircuitQuery, Option<Value>)> {
        let QueryWithFieldName {
            query: mut circuit_query,
            field_name,
            is_selective_disclosure,
        } = parsed;

        if field_name.is_empty() {
            return Ok((circuit_query, None));
        }
        let schema = self.schemas.load(&credential.credential_schema.id).await?;
        circuit_query.slot_index = field_slot_index(&field_name, &schema)?;

        let mut vp = None;
        if is_selective_disclosure {
            let value = disclosed_value(credential, &field_name)?;
            circuit_query.set_equality(value.mt_entry());
            vp = Some(create_verifiable_presentation(
                &query.context,
                &query.credential_type,
                &field_name,
                value.to_json(),
            ));
        }
        debug!(field = %field_name, slot = circuit_query.slot_index, "Translated slot query");
        Ok((circuit_query, vp))
    }

    async fn merklized(
        &self,
        query: &ProofQuery,
        parsed: QueryWithFieldName,
        credential: &W3CCredential,
        core_claim: &CoreClaim,
        position: MerklizedRootPosition,
    ) -> Result<(CircuitQuery, Option<Value>)> {
        let QueryWithFieldName {
            query: mut circuit_query,
            field_name,
            is_selective_disclosure,
        } = parsed;

        let context = self.schemas.load(&query.context).await?;
        let path = if field_name.is_empty() {
            Path::new(vec![PathPart::Key(CREDENTIAL_SUBJECT_IRI.into())])
        } else {
            subject_path(&context, &query.credential_type, &field_name)?
        };

        let disclosed = if is_selective_disclosure {
            Some(disclosed_value(credential, &field_name)?)
        } else {
            None
        };

        let document = MerklizedDocument::merklize(credential, &context)?;
        if core_claim.merklized_root()? != Some(document.root()) {
            return Err(WalletError::Consistency(
                "merklized root of the claim does not match the credential".into(),
            ));
        }

        let (mtp, value) = document.proof(&path)?;
        let value = value.map(MtValue::mt_entry).unwrap_or_else(Fr::zero);
        circuit_query.slot_index = position.slot_index().ok_or_else(|| {
            WalletError::Consistency("merklized claim has no root slot".into())
        })?;
        circuit_query.value_proof = Some(ValueProof {
            path: path.mt_entry(),
            value,
            mtp,
        });

        let vp = disclosed.map(|disclosed| {
            circuit_query.set_equality(value);
            create_verifiable_presentation(
                &query.context,
                &query.credential_type,
                &field_name,
                disclosed.to_json(),
            )
        });
        debug!(field = %field_name, slot = circuit_query.slot_index, "Translated merklized query");
        Ok((circuit_query, vp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subject(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_predicate() {
        let parsed = parse_request(Some(&subject(json!({"age": {"$eq": 5}})))).unwrap();
        assert_eq!(parsed.field_name, "age");
        assert!(!parsed.is_selective_disclosure);
        assert_eq!(parsed.query.operator, Operator::Eq);
        assert_eq!(parsed.query.values()[0], Fr::from(5u64));
        assert_eq!(parsed.query.values().len(), 64);
        assert!(parsed.query.values()[1..].iter().all(Fr::is_zero));
    }

    #[test]
    fn test_parse_set_and_disclosure() {
        let parsed =
            parse_request(Some(&subject(json!({"country": {"$in": [840, 120, 340]}})))).unwrap();
        assert_eq!(parsed.query.operator, Operator::In);
        assert_eq!(parsed.query.values()[2], Fr::from(340u64));

        let parsed = parse_request(Some(&subject(json!({"birthday": {}})))).unwrap();
        assert!(parsed.is_selective_disclosure);
        assert_eq!(parsed.query.operator, Operator::Noop);

        let parsed = parse_request(None).unwrap();
        assert_eq!(parsed.field_name, "");
        assert_eq!(parsed.query, CircuitQuery::noop());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            json!({"a": {"$eq": 1}, "b": {"$eq": 2}}),
            json!({"a": {"$eq": 1, "$ne": 2}}),
            json!({"a": {"$regex": "x"}}),
            json!({"a": {"$in": 1}}),
            json!({"a": {"$eq": [1, 2]}}),
            json!({"a": 1}),
        ] {
            let err = parse_request(Some(&subject(bad))).unwrap_err();
            assert!(matches!(err, WalletError::Validation(_)), "{err}");
        }
    }

    #[test]
    fn test_subject_value_lookup() {
        let s = subject(json!({"address": {"city": "Paris"}, "tags": ["a", "b"]}));
        assert_eq!(subject_value(&s, "address.city"), Some(&json!("Paris")));
        assert_eq!(subject_value(&s, "tags.1"), Some(&json!("b")));
        assert_eq!(subject_value(&s, "address.zip"), None);
    }
}
