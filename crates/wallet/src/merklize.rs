//! Merklized credential documents.
//!
//! Every leaf of `credentialSubject` becomes one entry of a sparse Merkle
//! tree, keyed by the hash of its expanded JSON-LD path and valued by the
//! hash of its value. Term expansion follows the credential type's JSON-LD
//! context: scoped `@context`s, `prefix:suffix` compact IRIs and `@vocab`.

use std::collections::HashMap;

use ark_bn254::Fr;
use serde_json::{Map, Value};

use identity_circuits::encoding::hash_string;
use identity_circuits::inputs::CLAIM_PATH_LEVELS;
use identity_circuits::poseidon::poseidon_hash_many;
use identity_circuits::{Hash, Proof, SparseMerkleTree};

use crate::credential::W3CCredential;
use crate::error::{Result, WalletError};

pub const CREDENTIAL_SUBJECT_IRI: &str = "https://www.w3.org/2018/credentials#credentialSubject";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathPart {
    Key(String),
    Index(usize),
}

impl PathPart {
    fn mt_entry(&self) -> Fr {
        match self {
            Self::Key(iri) => hash_string(iri),
            Self::Index(i) => Fr::from(*i as u64),
        }
    }
}

/// Expanded JSON-LD path to a value inside a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    parts: Vec<PathPart>,
}

impl Path {
    pub fn new(parts: Vec<PathPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[PathPart] {
        &self.parts
    }

    pub fn prepend(&mut self, parts: Vec<PathPart>) {
        self.parts.splice(0..0, parts);
    }

    /// Key of the path in a merklized document tree.
    pub fn mt_entry(&self) -> Fr {
        let elements: Vec<Fr> = self.parts.iter().map(PathPart::mt_entry).collect();
        poseidon_hash_many(&elements)
    }

    /// Resolve a dotted field name (`a.b`, `list.0`) of `credential_type`
    /// against a JSON-LD context document.
    pub fn from_context(document: &Value, credential_type: &str, field: &str) -> Result<Self> {
        let mut scopes = top_level_contexts(document)?;
        let type_def = lookup(&scopes, credential_type).ok_or_else(|| {
            WalletError::Validation(format!("type {credential_type} is not defined in context"))
        })?;
        if let Some(scoped) = type_def.get("@context").and_then(Value::as_object) {
            scopes.push(scoped);
        }

        let mut parts = Vec::new();
        for segment in field.split('.') {
            if segment.is_empty() {
                return Err(WalletError::Validation(format!("invalid field path {field:?}")));
            }
            if let Ok(index) = segment.parse::<usize>() {
                parts.push(PathPart::Index(index));
                continue;
            }
            let iri = match lookup(&scopes, segment) {
                Some(Value::String(iri)) => iri.as_str(),
                Some(Value::Object(def)) => {
                    let id = def.get("@id").and_then(Value::as_str).ok_or_else(|| {
                        WalletError::Validation(format!("term {segment} has no @id"))
                    })?;
                    if let Some(scoped) = def.get("@context").and_then(Value::as_object) {
                        scopes.push(scoped);
                    }
                    id
                }
                Some(_) => {
                    return Err(WalletError::Validation(format!("term {segment} is malformed")))
                }
                None => segment,
            };
            parts.push(PathPart::Key(expand(&scopes, iri)?));
        }
        Ok(Self { parts })
    }
}

fn top_level_contexts(document: &Value) -> Result<Vec<&Map<String, Value>>> {
    match document.get("@context") {
        Some(Value::Object(ctx)) => Ok(vec![ctx]),
        Some(Value::Array(items)) => Ok(items.iter().filter_map(Value::as_object).collect()),
        _ => Err(WalletError::Validation("document has no @context".into())),
    }
}

fn lookup<'a>(scopes: &[&'a Map<String, Value>], term: &str) -> Option<&'a Value> {
    scopes.iter().rev().find_map(|ctx| ctx.get(term))
}

fn expand(scopes: &[&Map<String, Value>], iri: &str) -> Result<String> {
    if iri.contains("://") {
        return Ok(iri.to_string());
    }
    if let Some((prefix, suffix)) = iri.split_once(':') {
        if let Some(Value::String(base)) = lookup(scopes, prefix) {
            return Ok(format!("{base}{suffix}"));
        }
    }
    match lookup(scopes, "@vocab") {
        Some(Value::String(vocab)) => Ok(format!("{vocab}{iri}")),
        _ => Err(WalletError::Validation(format!("cannot expand term {iri}"))),
    }
}

/// A scalar document value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MtValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl MtValue {
    /// Only scalars can be merklized or disclosed.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Int).ok_or_else(|| {
                WalletError::Validation(format!("number {n} is not a 64-bit integer"))
            }),
            Value::Null => Err(WalletError::Validation("null values are not supported".into())),
            Value::Array(_) | Value::Object(_) => Err(WalletError::Validation(
                "object and array values cannot be disclosed".into(),
            )),
        }
    }

    /// Field encoding used as tree value and query value.
    pub fn mt_entry(&self) -> Fr {
        match self {
            Self::Int(n) if *n < 0 => -Fr::from(n.unsigned_abs()),
            Self::Int(n) => Fr::from(*n as u64),
            Self::Bool(b) => Fr::from(*b as u64),
            Self::Str(s) => hash_string(s),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

/// A credential subject merklized into a sparse Merkle tree.
pub struct MerklizedDocument {
    tree: SparseMerkleTree,
    values: HashMap<Hash, MtValue>,
}

impl MerklizedDocument {
    /// Merklize `credential`'s subject using its type's JSON-LD context.
    /// `id` and `type` of the subject are not merklized.
    pub fn merklize(credential: &W3CCredential, context: &Value) -> Result<Self> {
        let credential_type = credential
            .schema_type()
            .ok_or_else(|| WalletError::Validation("credential has no schema type".into()))?;
        Self::from_subject(&credential.credential_subject, credential_type, context)
    }

    pub fn from_subject(
        subject: &Map<String, Value>,
        credential_type: &str,
        context: &Value,
    ) -> Result<Self> {
        let mut leaves = Vec::new();
        for (field, value) in subject {
            if field == "id" || field == "type" {
                continue;
            }
            flatten(field.clone(), value, &mut leaves);
        }

        let mut doc = Self {
            tree: SparseMerkleTree::new(CLAIM_PATH_LEVELS)?,
            values: HashMap::new(),
        };
        for (field, value) in leaves {
            let path = subject_path(context, credential_type, &field)?;
            let value = MtValue::from_json(value)?;
            let key = path.mt_entry();
            doc.tree.add(key, value.mt_entry())?;
            doc.values.insert(Hash(key), value);
        }
        Ok(doc)
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    /// Proof of the entry at `path` and the value found there.
    pub fn proof(&self, path: &Path) -> Result<(Proof, Option<&MtValue>)> {
        let key = path.mt_entry();
        let (proof, _) = self.tree.generate_proof(key)?;
        Ok((proof, self.values.get(&Hash(key))))
    }

    pub fn raw_value(&self, path: &Path) -> Option<&MtValue> {
        self.values.get(&Hash(path.mt_entry()))
    }
}

/// Path of a subject field, rooted at `credentialSubject`.
pub fn subject_path(context: &Value, credential_type: &str, field: &str) -> Result<Path> {
    let mut path = Path::from_context(context, credential_type, field)?;
    path.prepend(vec![PathPart::Key(CREDENTIAL_SUBJECT_IRI.into())]);
    Ok(path)
}

fn flatten<'a>(prefix: String, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{prefix}.{k}"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(format!("{prefix}.{i}"), v, out);
            }
        }
        Value::Null => {}
        _ => out.push((prefix, value)),
    }
}
