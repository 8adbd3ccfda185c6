//! Built-in reference scales with coded calculations and known-answer
//! test vectors.
//!
//! Scales whose algorithm fits the generic rule model also expose that
//! rule, so the same vectors can be run through the generic evaluator.

mod cha2ds2_vasc;
mod cockcroft_gault;
mod curb65;
mod meld;
mod prevent;
mod wells_dvt;

pub use cha2ds2_vasc::Cha2ds2Vasc;
pub use cockcroft_gault::CockcroftGault;
pub use curb65::Curb65;
pub use meld::Meld;
pub use prevent::Prevent;
pub use wells_dvt::WellsDvt;

use std::collections::BTreeMap;

use crate::engine::{EvaluationError, EvaluationResult, ResolvedInputs};
use crate::models::{
    CategoricalOption, InputValue, Inputs, InterpretationTable, LocalizedText, Scale, ScoringRule,
    Variable,
};

/// Result of a coded calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutcome {
    pub score: f64,
    pub category: Option<String>,
    pub interpretation: String,
    pub recommendation: String,
    /// Named secondary outputs
    pub details: BTreeMap<String, f64>,
}

/// A known-answer case.
#[derive(Debug, Clone)]
pub struct TestVector {
    pub name: &'static str,
    pub inputs: Vec<(&'static str, InputValue)>,
    pub expected: f64,
    pub tolerance: f64,
    pub expected_category: Option<&'static str>,
}

impl TestVector {
    pub fn inputs(&self) -> Inputs {
        self.inputs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}

/// A validated, hand-coded scale.
pub trait ReferenceScale: Send + Sync {
    /// Normalized identifier (e.g. "cha2ds2_vasc").
    fn code_name(&self) -> &'static str;

    fn name(&self) -> LocalizedText;

    fn description(&self) -> &'static str;

    /// Literature reference.
    fn reference(&self) -> &'static str;

    fn category(&self) -> Vec<String> {
        Vec::new()
    }

    fn variables(&self) -> Vec<Variable>;

    /// Coded calculation over resolved inputs.
    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome>;

    fn test_vectors(&self) -> Vec<TestVector>;

    /// Equivalent generic rule, when the algorithm fits one.
    fn generic_rule(&self) -> Option<ScoringRule> {
        None
    }

    fn interpretation(&self) -> InterpretationTable {
        InterpretationTable::default()
    }

    /// Persistable scale definition (generic-capable scales only).
    fn to_scale(&self) -> Option<Scale> {
        let rule = self.generic_rule()?;
        let variables = self.variables().into_iter().map(|v| v.name).collect();
        let mut scale = Scale::new(self.code_name(), self.name(), variables, rule)
            .with_interpretation(self.interpretation())
            .with_description(self.description());
        scale.category = self.category();
        scale.reference = Some(self.reference().to_string());
        Some(scale)
    }
}

/// All built-in reference scales.
pub fn all_reference_scales() -> Vec<Box<dyn ReferenceScale>> {
    vec![
        Box::new(Prevent),
        Box::new(Cha2ds2Vasc),
        Box::new(Curb65),
        Box::new(WellsDvt),
        Box::new(Meld),
        Box::new(CockcroftGault),
    ]
}

/// Look up a reference scale by code name.
pub fn get_reference_scale(code_name: &str) -> Option<Box<dyn ReferenceScale>> {
    let wanted = crate::models::normalize_code_name(code_name);
    all_reference_scales()
        .into_iter()
        .find(|s| s.code_name() == wanted)
}

/// Minimum Jaro-Winkler similarity for a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Closest reference scale to a free-text name, with its similarity.
pub fn find_closest(name: &str) -> Option<(Box<dyn ReferenceScale>, f64)> {
    let query = crate::models::normalize_code_name(name);
    if query.is_empty() {
        return None;
    }

    all_reference_scales()
        .into_iter()
        .map(|scale| {
            let by_code = strsim::jaro_winkler(&query, scale.code_name());
            let by_name = scale
                .name()
                .0
                .values()
                .map(|n| strsim::jaro_winkler(&query, &crate::models::normalize_code_name(n)))
                .fold(0.0, f64::max);
            let similarity = by_code.max(by_name);
            (scale, similarity)
        })
        .filter(|(_, similarity)| *similarity >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

// ============================================================================
// Shared builders
// ============================================================================

/// "No"/"Yes" variable with the given points for "Yes".
pub(crate) fn yes_no(name: &str, description: &str, yes_points: f64) -> Variable {
    Variable::categorical(
        name,
        description,
        vec![
            CategoricalOption::new("No", 0.0),
            CategoricalOption::new("Yes", yes_points),
        ],
    )
}

/// Age in years. Scales with a narrower validated range check it in
/// their calculation, since the definition is shared by name.
pub(crate) fn patient_age() -> Variable {
    Variable::numerical("age", "Patient age", Some("year")).with_bounds(Some(18.0), Some(120.0))
}

/// Biological sex. Option points carry the Cockcroft-Gault sex factor.
pub(crate) fn patient_sex() -> Variable {
    Variable::categorical(
        "sex",
        "Biological sex",
        vec![
            CategoricalOption::new("male", 1.0).with_label("Male"),
            CategoricalOption::new("female", FEMALE_CLEARANCE_FACTOR).with_label("Female"),
        ],
    )
}

pub(crate) const FEMALE_CLEARANCE_FACTOR: f64 = 0.85;

pub(crate) fn serum_creatinine() -> Variable {
    Variable::numerical("creatinine", "Serum creatinine", Some("mg/dL"))
        .with_units(&["mg/dL", "umol/L"])
        .with_bounds(Some(0.1), Some(20.0))
}

/// Fail when `value` lies outside a scale's validated range.
pub(crate) fn check_range(variable: &str, value: f64, min: f64, max: f64) -> EvaluationResult<f64> {
    if value < min || value > max {
        return Err(EvaluationError::ValueOutOfRange {
            variable: variable.to_string(),
            value,
            min: Some(min),
            max: Some(max),
        });
    }
    Ok(value)
}

/// Sum of option points over every variable.
pub(crate) fn points_total(
    variables: &[Variable],
    inputs: &ResolvedInputs,
) -> EvaluationResult<f64> {
    variables
        .iter()
        .map(|v| inputs.points(&v.name))
        .sum::<EvaluationResult<f64>>()
}

/// Round to two decimals, half-to-even.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub(crate) fn text(value: &str) -> InputValue {
    InputValue::new(value)
}

pub(crate) fn number(value: f64) -> InputValue {
    InputValue::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_codes_are_unique() {
        let scales = all_reference_scales();
        let mut codes: Vec<&str> = scales.iter().map(|s| s.code_name()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 6);
    }

    #[test]
    fn test_lookup_normalizes() {
        assert!(get_reference_scale("CHA2DS2-VASc").is_some());
        assert!(get_reference_scale("curb_65").is_some());
        assert!(get_reference_scale("apache_ii").is_none());
    }

    #[test]
    fn test_find_closest() {
        let (scale, similarity) = find_closest("cha2ds2 vasc score").unwrap();
        assert_eq!(scale.code_name(), "cha2ds2_vasc");
        assert!(similarity >= SUGGESTION_THRESHOLD);

        let (scale, _) = find_closest("Wells DVT").unwrap();
        assert_eq!(scale.code_name(), "wells_dvt");

        assert!(find_closest("").is_none());
    }

    #[test]
    fn test_every_scale_has_vectors() {
        for scale in all_reference_scales() {
            assert!(!scale.test_vectors().is_empty(), "{}", scale.code_name());
            assert!(!scale.variables().is_empty(), "{}", scale.code_name());
        }
    }

    #[test]
    fn test_prevent_has_no_generic_scale() {
        assert!(get_reference_scale("prevent").unwrap().to_scale().is_none());
        let scale = get_reference_scale("meld").unwrap().to_scale().unwrap();
        assert_eq!(scale.variables.len(), 5);
    }

    #[test]
    fn test_shared_names_share_definitions() {
        let mut seen: BTreeMap<String, (&str, Variable)> = BTreeMap::new();
        for scale in all_reference_scales() {
            for variable in scale.variables() {
                match seen.get(&variable.name) {
                    Some((owner, first)) => assert_eq!(
                        first,
                        &variable,
                        "'{}' differs between {} and {}",
                        variable.name,
                        owner,
                        scale.code_name()
                    ),
                    None => {
                        seen.insert(variable.name.clone(), (scale.code_name(), variable));
                    }
                }
            }
        }
        assert!(seen.contains_key("age_65_or_older"));
        assert!(seen.contains_key("age_band"));
    }

    #[test]
    fn test_round2_half_even() {
        assert_eq!(round2(41.666666), 41.67);
        assert_eq!(round2(0.125), 0.12);
    }
}
