//! Canonical circuit queries.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::Zero;

use crate::encoding::fr_to_decimal;
use crate::error::CircuitError;
use crate::smt::Proof;

/// Width of the zero-padded value array every query circuit takes.
pub const MAX_QUERY_VALUES: usize = 64;

/// Comparison operators understood by the query circuits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Noop,
    Eq,
    Lt,
    Gt,
    In,
    Nin,
    Ne,
}

impl Operator {
    const NAMES: [(&'static str, Operator); 6] = [
        ("$eq", Operator::Eq),
        ("$lt", Operator::Lt),
        ("$gt", Operator::Gt),
        ("$in", Operator::In),
        ("$nin", Operator::Nin),
        ("$ne", Operator::Ne),
    ];

    /// Look up a query operator by its `$name`; unknown names fail.
    pub fn from_name(name: &str) -> Result<Self, CircuitError> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, op)| *op)
            .ok_or_else(|| CircuitError::InvalidQuery(format!("unknown operator {name:?}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Noop => "$noop",
            Self::Eq => "$eq",
            Self::Lt => "$lt",
            Self::Gt => "$gt",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Ne => "$ne",
        }
    }

    /// Numeric code fed to circuits.
    pub fn code(&self) -> u64 {
        match self {
            Self::Noop => 0,
            Self::Eq => 1,
            Self::Lt => 2,
            Self::Gt => 3,
            Self::In => 4,
            Self::Nin => 5,
            Self::Ne => 6,
        }
    }

    /// Whether the operator compares against a set of values.
    pub fn takes_set(&self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "$noop" {
            return Ok(Self::Noop);
        }
        Self::from_name(s)
    }
}

/// Proof that a merklized path holds a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueProof {
    /// Merkle-entry encoding of the JSON-LD path
    pub path: Fr,
    /// Merkle-entry encoding of the value (zero when absent)
    pub value: Fr,
    pub mtp: Proof,
}

/// Query in the form circuits consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitQuery {
    pub slot_index: usize,
    pub operator: Operator,
    values: Vec<Fr>,
    pub value_proof: Option<ValueProof>,
}

impl CircuitQuery {
    /// Build a query, padding `values` with zeros to `MAX_QUERY_VALUES`.
    pub fn new(operator: Operator, values: Vec<Fr>) -> Result<Self, CircuitError> {
        let expected = match operator {
            Operator::Noop => 0..=0,
            Operator::In | Operator::Nin => 1..=MAX_QUERY_VALUES,
            _ => 1..=1,
        };
        if !expected.contains(&values.len()) {
            return Err(CircuitError::InvalidQuery(format!(
                "operator {operator} takes {}..={} values, got {}",
                expected.start(),
                expected.end(),
                values.len()
            )));
        }
        let mut padded = values;
        padded.resize(MAX_QUERY_VALUES, Fr::zero());
        Ok(Self {
            slot_index: 0,
            operator,
            values: padded,
            value_proof: None,
        })
    }

    /// The no-op query: proves possession without a predicate.
    pub fn noop() -> Self {
        Self {
            slot_index: 0,
            operator: Operator::Noop,
            values: vec![Fr::zero(); MAX_QUERY_VALUES],
            value_proof: None,
        }
    }

    /// The full zero-padded value array.
    pub fn values(&self) -> &[Fr] {
        &self.values
    }

    /// Replace the predicate with `$eq value`, used by selective disclosure.
    pub fn set_equality(&mut self, value: Fr) {
        self.operator = Operator::Eq;
        self.values = vec![Fr::zero(); MAX_QUERY_VALUES];
        self.values[0] = value;
    }

    pub fn marshal_values(&self) -> Vec<String> {
        self.values.iter().map(fr_to_decimal).collect()
    }
}
