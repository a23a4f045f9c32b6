//! Verifiable presentations for selectively disclosed fields.

use serde_json::{json, Map, Value};

use crate::credential::{VERIFIABLE_CREDENTIAL_TYPE, W3C_CREDENTIALS_CONTEXT};

pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

/// Presentation disclosing a single field. Dotted field names nest.
pub fn create_verifiable_presentation(
    context: &str,
    credential_type: &str,
    field: &str,
    value: Value,
) -> Value {
    let mut subject = Map::new();
    subject.insert("type".into(), Value::String(credential_type.to_string()));

    let mut segments: Vec<&str> = field.split('.').collect();
    let last = segments.pop().unwrap_or(field);
    let mut nested = value;
    let mut key = last;
    while let Some(parent) = segments.pop() {
        let mut object = Map::new();
        object.insert(key.to_string(), nested);
        nested = Value::Object(object);
        key = parent;
    }
    subject.insert(key.to_string(), nested);

    json!({
        "@context": [W3C_CREDENTIALS_CONTEXT],
        "@type": VERIFIABLE_PRESENTATION_TYPE,
        "verifiableCredential": {
            "@context": [W3C_CREDENTIALS_CONTEXT, context],
            "@type": [VERIFIABLE_CREDENTIAL_TYPE, credential_type],
            "credentialSubject": subject,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_shape() {
        let vp = create_verifiable_presentation(
            "https://example.com/kyc.jsonld",
            "KYCAgeCredential",
            "birthday",
            json!(19960424),
        );
        assert_eq!(vp["@type"], VERIFIABLE_PRESENTATION_TYPE);
        let cred = &vp["verifiableCredential"];
        assert_eq!(cred["@type"][1], "KYCAgeCredential");
        assert_eq!(cred["@context"][1], "https://example.com/kyc.jsonld");
        assert_eq!(cred["credentialSubject"]["birthday"], 19960424);
    }

    #[test]
    fn test_nested_field() {
        let vp = create_verifiable_presentation("ctx", "T", "address.city", json!("Paris"));
        assert_eq!(vp["verifiableCredential"]["credentialSubject"]["address"]["city"], "Paris");
    }
}
