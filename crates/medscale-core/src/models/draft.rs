//! Extraction drafts: the JSON shape an LLM (or a human author) produces
//! before a scale is validated and persisted.
//!
//! Pipeline: ScaleDraft → validate → (Scale, Vec<Variable>)

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::{
    normalize_code_name, CategoricalOption, InterpretationEntry, InterpretationTable, LocalizedText,
    Scale, ScoringRule, Variable, VariableKind,
};
use crate::engine::{Formula, FormulaError};
use crate::units::{MeasurementCategory, UnitResolver};

/// Draft validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DraftError {
    #[error("Scale name is empty")]
    EmptyName,

    #[error("Variable #{index} has an empty name")]
    EmptyVariableName { index: usize },

    #[error("Variable declared twice: {0}")]
    DuplicateVariable(String),

    #[error("Select variable has no options: {0}")]
    NoOptions(String),

    #[error("Formula calculation without a formula")]
    MissingFormula,

    #[error("Invalid formula: {0}")]
    Formula(#[from] FormulaError),

    #[error("Formula references undeclared variable: {0}")]
    UndeclaredVariable(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalculationType {
    Sum,
    Formula,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DraftVariableType {
    Select,
    Number,
}

/// One answer of a select variable. LLMs emit codes as strings or numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftOption {
    #[serde(deserialize_with = "code_string")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DraftVariableType,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<DraftOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Candidate scale as produced by extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleDraft {
    pub scale_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "calculationType")]
    pub calculation_type: CalculationType,
    #[serde(default)]
    pub variables: Vec<DraftVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default)]
    pub interpretation: Vec<InterpretationEntry>,
    /// General recommendation, used for entries that carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

fn code_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl ScaleDraft {
    /// Validate the draft and build the scale plus its variable definitions.
    ///
    /// Variable names are normalized to code names; a formula must only
    /// reference declared (normalized) names.
    pub fn into_scale_and_variables(
        self,
        units: &UnitResolver,
    ) -> Result<(Scale, Vec<Variable>), DraftError> {
        let code_name = normalize_code_name(&self.scale_name);
        if code_name.is_empty() {
            return Err(DraftError::EmptyName);
        }

        let mut seen = BTreeSet::new();
        let mut variables = Vec::with_capacity(self.variables.len());
        for (index, draft) in self.variables.into_iter().enumerate() {
            let variable = draft_variable(index, draft, units)?;
            if !seen.insert(variable.name.clone()) {
                return Err(DraftError::DuplicateVariable(variable.name));
            }
            variables.push(variable);
        }

        let rule = match self.calculation_type {
            CalculationType::Sum => ScoringRule::SumOfPoints,
            CalculationType::Formula => {
                let source = self
                    .formula
                    .filter(|f| !f.trim().is_empty())
                    .ok_or(DraftError::MissingFormula)?;
                let formula = Formula::parse(&source)?;
                let undeclared = formula.identifiers().into_iter().find(|id| !seen.contains(id));
                if let Some(name) = undeclared {
                    return Err(DraftError::UndeclaredVariable(name));
                }
                ScoringRule::Formula { expression: source }
            }
        };

        let general = self.recommendation.unwrap_or_default();
        let entries = self
            .interpretation
            .into_iter()
            .map(|mut entry| {
                if entry.recommendation.trim().is_empty() {
                    entry.recommendation = general.clone();
                }
                entry
            })
            .collect();

        let names = variables.iter().map(|v| v.name.clone()).collect();
        let title = LocalizedText::english(self.scale_name.trim());
        let mut scale = Scale::new(&code_name, title, names, rule)
            .with_interpretation(InterpretationTable::english(entries))
            .with_description(self.description);
        scale.reference = self.reference.filter(|r| !r.trim().is_empty());

        Ok((scale, variables))
    }
}

fn draft_variable(
    index: usize,
    draft: DraftVariable,
    units: &UnitResolver,
) -> Result<Variable, DraftError> {
    let name = normalize_code_name(&draft.name);
    if name.is_empty() {
        return Err(DraftError::EmptyVariableName { index });
    }
    let description = if draft.description.trim().is_empty() {
        draft.name.trim().to_string()
    } else {
        draft.description
    };

    let variable = match draft.kind {
        DraftVariableType::Select => {
            if draft.options.is_empty() {
                return Err(DraftError::NoOptions(name));
            }
            let options = draft
                .options
                .into_iter()
                .map(|o| CategoricalOption {
                    value: o.value,
                    label: o.label,
                    points: o.points,
                })
                .collect();
            Variable::categorical(&name, description, options)
        }
        DraftVariableType::Number => {
            let standard = draft
                .unit
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .map(|u| units.canonicalize(u).unwrap_or(u.trim()).to_string());
            let possible_units = possible_units(&name, &description, standard.as_deref(), units);
            Variable {
                name: name.clone(),
                medical_name: LocalizedText::english(description.clone()),
                description,
                kind: VariableKind::Numerical {
                    standard_unit: standard,
                    possible_units,
                    min: draft.min,
                    max: draft.max,
                },
            }
        }
    };

    Ok(variable)
}

/// Units of the variable's category when the standard unit belongs to it,
/// else just the standard unit.
fn possible_units(
    name: &str,
    description: &str,
    standard: Option<&str>,
    units: &UnitResolver,
) -> Vec<String> {
    let Some(standard) = standard else {
        return Vec::new();
    };
    [units.classify(name), units.classify(description)]
        .into_iter()
        .find(|c| *c != MeasurementCategory::Other && c.contains(standard, standard))
        .map(|c| c.compatible_units().into_iter().map(str::to_string).collect())
        .unwrap_or_else(|| vec![standard.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURB_DRAFT: &str = r#"{
        "scale_name": "CURB-65",
        "description": "Pneumonia severity",
        "reference": "Lim WS, et al. Thorax. 2003",
        "calculationType": "sum",
        "variables": [
            {"name": "confusion", "type": "select", "description": "New confusion",
             "options": [{"value": "No", "points": 0}, {"value": "Yes", "points": 1}]},
            {"name": "age", "type": "select", "description": "Age >= 65",
             "options": [{"value": 0, "label": "<65"}, {"value": 1, "label": ">=65"}]}
        ],
        "interpretation": [
            {"range": "0-1", "meaning": "Low risk"},
            {"range": "2+", "meaning": "High risk", "recommendation": "Admit"}
        ],
        "recommendation": "Follow local guidelines"
    }"#;

    #[test]
    fn test_sum_draft() {
        let draft: ScaleDraft = serde_json::from_str(CURB_DRAFT).unwrap();
        let (scale, variables) = draft.into_scale_and_variables(&UnitResolver::new()).unwrap();

        assert_eq!(scale.code_name, "curb_65");
        assert_eq!(scale.rule, ScoringRule::SumOfPoints);
        assert_eq!(scale.variables, vec!["confusion", "age"]);
        assert_eq!(variables[1].options()[1].value, "1");

        let entries = scale.interpretation.entries("en");
        assert_eq!(entries[0].recommendation, "Follow local guidelines");
        assert_eq!(entries[1].recommendation, "Admit");
    }

    #[test]
    fn test_formula_draft_units() {
        let json = r#"{
            "scale_name": "Corrected Calcium",
            "calculationType": "formula",
            "formula": "calcium + 0.8 * (4 - albumin)",
            "variables": [
                {"name": "Calcium", "type": "number", "unit": "mg/dl"},
                {"name": "albumin", "type": "number", "unit": "g/dL", "min": 0.5, "max": 7}
            ]
        }"#;
        let draft: ScaleDraft = serde_json::from_str(json).unwrap();
        let (scale, variables) = draft.into_scale_and_variables(&UnitResolver::new()).unwrap();

        assert_eq!(scale.rule.formula_source(), Some("calcium + 0.8 * (4 - albumin)"));
        assert_eq!(variables[0].name, "calcium");
        assert_eq!(variables[0].standard_unit(), Some("mg/dL"));
        match &variables[0].kind {
            VariableKind::Numerical { possible_units, .. } => {
                assert!(possible_units.contains(&"mmol/L".to_string()))
            }
            _ => panic!("expected numerical"),
        }
    }

    #[test]
    fn test_formula_with_undeclared_name() {
        let json = r#"{
            "scale_name": "Broken",
            "calculationType": "formula",
            "formula": "a + b",
            "variables": [{"name": "a", "type": "number"}]
        }"#;
        let draft: ScaleDraft = serde_json::from_str(json).unwrap();
        let err = draft.into_scale_and_variables(&UnitResolver::new()).unwrap_err();
        assert_eq!(err, DraftError::UndeclaredVariable("b".into()));
    }

    #[test]
    fn test_rejects_bad_drafts() {
        let units = UnitResolver::new();
        let missing_formula: ScaleDraft =
            serde_json::from_str(r#"{"scale_name": "X", "calculationType": "formula"}"#).unwrap();
        assert_eq!(
            missing_formula.into_scale_and_variables(&units).unwrap_err(),
            DraftError::MissingFormula
        );

        let no_options: ScaleDraft = serde_json::from_str(
            r#"{"scale_name": "X", "calculationType": "sum",
                "variables": [{"name": "a", "type": "select"}]}"#,
        )
        .unwrap();
        assert_eq!(
            no_options.into_scale_and_variables(&units).unwrap_err(),
            DraftError::NoOptions("a".into())
        );

        let empty: ScaleDraft = serde_json::from_str(r#"{"scale_name": " ", "calculationType": "sum"}"#).unwrap();
        assert_eq!(empty.into_scale_and_variables(&units).unwrap_err(), DraftError::EmptyName);
    }
}
