//! Evaluation requests, inputs and results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{InterpretationTable, ScoringRule, Variable};

/// A raw value as entered: number, boolean or free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// One user-supplied input: a value plus the unit it was entered in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputValue {
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl InputValue {
    /// A unitless value (categorical code or standard-unit number).
    pub fn new(value: impl Into<RawValue>) -> Self {
        Self {
            value: Some(value.into()),
            unit: None,
        }
    }

    /// A numeric value in an explicit unit.
    pub fn with_unit(value: f64, unit: &str) -> Self {
        Self {
            value: Some(RawValue::Number(value)),
            unit: Some(unit.to_string()),
        }
    }
}

/// Inputs keyed by variable name.
pub type Inputs = BTreeMap<String, InputValue>;

/// Contribution of one variable to a score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableContribution {
    pub variable: String,
    /// Categorical code or normalized number, as text
    pub value: String,
    /// Points (sum) or normalized value (formula)
    pub contribution: f64,
}

/// Ephemeral result of evaluating a scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationResult {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub interpretation: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakdown: Vec<VariableContribution>,
    /// Named secondary outputs (e.g. "meld", "thirty_year_total_cvd")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, f64>,
}

fn default_language() -> String {
    super::FALLBACK_LANGUAGE.to_string()
}

/// Self-contained evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRequest {
    pub rule: ScoringRule,
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub interpretation: InterpretationTable,
}
