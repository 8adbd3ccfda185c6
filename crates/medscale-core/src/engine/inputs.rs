//! Input resolution: raw values + units → normalized numbers and codes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EvaluationError, EvaluationResult};
use crate::config::EngineConfig;
use crate::models::{CategoricalOption, InputValue, Inputs, RawValue, Variable, VariableKind};
use crate::units::{MeasurementCategory, UnitResolver};

const TRUTHY: &[&str] = &[
    "true", "yes", "y", "1", "sim", "s", "si", "sí", "verdadeiro", "verdadero",
];
const FALSY: &[&str] = &["false", "no", "n", "0", "não", "nao", "falso"];

/// A validated input value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedValue {
    /// Matched option code and its point weight (if any)
    Categorical { code: String, points: Option<f64> },
    /// Value in the variable's standard unit
    Numerical { value: f64 },
}

impl ResolvedValue {
    /// Numeric substitution: normalized number, or the option's points.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numerical { value } => Some(*value),
            Self::Categorical { points, .. } => *points,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Numerical { value } => value.to_string(),
            Self::Categorical { code, .. } => code.clone(),
        }
    }
}

/// Validated inputs keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    values: BTreeMap<String, ResolvedValue>,
}

impl ResolvedInputs {
    pub fn insert(&mut self, name: &str, value: ResolvedValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedValue)> {
        self.values.iter()
    }

    /// Normalized number or option points.
    pub fn number(&self, name: &str) -> EvaluationResult<f64> {
        self.get(name)
            .and_then(ResolvedValue::as_number)
            .ok_or_else(|| EvaluationError::missing(name))
    }

    /// Option points, 0 for an unweighted option.
    pub fn points(&self, name: &str) -> EvaluationResult<f64> {
        match self.get(name) {
            Some(ResolvedValue::Categorical { points, .. }) => Ok(points.unwrap_or(0.0)),
            Some(ResolvedValue::Numerical { value }) => Ok(*value),
            None => Err(EvaluationError::missing(name)),
        }
    }

    /// Matched option code.
    pub fn code(&self, name: &str) -> EvaluationResult<&str> {
        match self.get(name) {
            Some(ResolvedValue::Categorical { code, .. }) => Ok(code.as_str()),
            _ => Err(EvaluationError::missing(name)),
        }
    }

    /// Whether a boolean-like categorical answer is affirmative.
    pub fn flag(&self, name: &str) -> EvaluationResult<bool> {
        let code = self.code(name)?;
        Ok(TRUTHY.contains(&code.to_lowercase().as_str()))
    }
}

/// Resolve every declared variable that has an input.
///
/// Names in `required` must be present; others are optional.
pub fn resolve_inputs(
    variables: &[Variable],
    required: &BTreeSet<String>,
    inputs: &Inputs,
    units: &UnitResolver,
    config: &EngineConfig,
) -> EvaluationResult<ResolvedInputs> {
    let mut resolved = ResolvedInputs::default();

    for variable in variables {
        let input = inputs.get(&variable.name).filter(|i| i.value.is_some());
        match input {
            Some(input) => {
                let value = resolve_value(variable, input, units, config)?;
                resolved.insert(&variable.name, value);
            }
            None if required.contains(&variable.name) => {
                return Err(EvaluationError::missing(&variable.name));
            }
            None => {}
        }
    }

    Ok(resolved)
}

/// Resolve one input against its variable definition.
pub fn resolve_value(
    variable: &Variable,
    input: &InputValue,
    units: &UnitResolver,
    config: &EngineConfig,
) -> EvaluationResult<ResolvedValue> {
    let raw = input
        .value
        .as_ref()
        .ok_or_else(|| EvaluationError::missing(&variable.name))?;

    match &variable.kind {
        VariableKind::Categorical { options } => {
            let option = match_option(&variable.name, options, raw)?;
            Ok(ResolvedValue::Categorical {
                code: option.value.clone(),
                points: option.resolved_points(),
            })
        }
        VariableKind::Numerical {
            standard_unit,
            min,
            max,
            ..
        } => {
            let number = parse_number(raw).ok_or_else(|| EvaluationError::missing(&variable.name))?;
            let value = normalize_unit(
                variable,
                number,
                input.unit.as_deref(),
                standard_unit.as_deref(),
                units,
                config,
            )?;

            let below = min.map_or(false, |lo| value < lo);
            let above = max.map_or(false, |hi| value > hi);
            if below || above {
                return Err(EvaluationError::ValueOutOfRange {
                    variable: variable.name.clone(),
                    value,
                    min: *min,
                    max: *max,
                });
            }
            Ok(ResolvedValue::Numerical { value })
        }
    }
}

fn parse_number(raw: &RawValue) -> Option<f64> {
    let number = match raw {
        RawValue::Number(n) => *n,
        RawValue::Text(text) => {
            let text = text.trim();
            text.parse::<f64>()
                .or_else(|_| text.replace(',', ".").parse::<f64>())
                .ok()?
        }
        RawValue::Bool(_) => return None,
    };
    number.is_finite().then_some(number)
}

fn normalize_unit(
    variable: &Variable,
    value: f64,
    unit: Option<&str>,
    standard_unit: Option<&str>,
    units: &UnitResolver,
    config: &EngineConfig,
) -> EvaluationResult<f64> {
    let Some(unit) = unit.filter(|u| !u.trim().is_empty()) else {
        return Ok(value);
    };

    let Some(standard) = standard_unit else {
        if config.strict_units {
            return Err(EvaluationError::IncompatibleUnits {
                variable: variable.name.clone(),
                from: unit.to_string(),
                to: String::new(),
            });
        }
        tracing::warn!(
            variable = %variable.name,
            unit,
            "Variable declares no standard unit; using value unchanged"
        );
        return Ok(value);
    };

    let incompatible = || EvaluationError::IncompatibleUnits {
        variable: variable.name.clone(),
        from: unit.to_string(),
        to: standard.to_string(),
    };

    let (Some(from), Some(to)) = (units.canonicalize(unit), units.canonicalize(standard)) else {
        return Err(incompatible());
    };
    if from == to {
        return Ok(value);
    }

    // Analyte factors need the variable's own category
    let candidates = [units.classify(&variable.name), units.classify(&variable.description)];
    let analyte = candidates
        .into_iter()
        .find(|c| *c != MeasurementCategory::Other && c.contains(from, to));

    let converted = match analyte {
        Some(category) => units.convert_in(category, value, from, to),
        None => units.convert(value, from, to),
    };
    converted.map_err(|_| incompatible())
}

fn categorical_text(raw: &RawValue) -> String {
    match raw {
        RawValue::Text(text) => text.trim().to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        RawValue::Number(n) => n.to_string(),
    }
}

/// Match exact, then case-insensitive, then boolean synonyms.
fn match_option<'a>(
    name: &str,
    options: &'a [CategoricalOption],
    raw: &RawValue,
) -> EvaluationResult<&'a CategoricalOption> {
    let text = categorical_text(raw);
    if text.is_empty() {
        return Err(EvaluationError::missing(name));
    }

    if let Some(option) = options.iter().find(|o| o.value == text) {
        return Ok(option);
    }

    let lower = text.to_lowercase();
    if let Some(option) = options.iter().find(|o| o.value.to_lowercase() == lower) {
        return Ok(option);
    }

    for synonyms in [TRUTHY, FALSY] {
        if synonyms.contains(&lower.as_str()) {
            if let Some(option) = options
                .iter()
                .find(|o| synonyms.contains(&o.value.to_lowercase().as_str()))
            {
                return Ok(option);
            }
        }
    }

    Err(EvaluationError::InvalidCategoricalValue {
        variable: name.to_string(),
        value: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yes_no(name: &str) -> Variable {
        Variable::categorical(
            name,
            name,
            vec![CategoricalOption::new("No", 0.0), CategoricalOption::new("Yes", 1.0)],
        )
    }

    fn creatinine() -> Variable {
        Variable::numerical("creatinine", "Serum creatinine", Some("mg/dL"))
            .with_units(&["mg/dL", "umol/L"])
            .with_bounds(Some(0.1), Some(20.0))
    }

    fn resolve(variable: &Variable, input: InputValue) -> EvaluationResult<ResolvedValue> {
        resolve_value(variable, &input, &UnitResolver::new(), &EngineConfig::default())
    }

    #[test]
    fn test_categorical_matching_order() {
        let var = yes_no("smoker");
        let code = |v: InputValue| match resolve(&var, v).unwrap() {
            ResolvedValue::Categorical { code, .. } => code,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(code(InputValue::new("Yes")), "Yes");
        assert_eq!(code(InputValue::new("yes")), "Yes");
        assert_eq!(code(InputValue::new("sim")), "Yes");
        assert_eq!(code(InputValue::new(true)), "Yes");
        assert_eq!(code(InputValue::new(0.0)), "No");
        assert_eq!(code(InputValue::new("não")), "No");
    }

    #[test]
    fn test_numeric_codes() {
        let var = Variable::categorical(
            "age_band",
            "Age band",
            vec![CategoricalOption::new("0", 0.0), CategoricalOption::new("2", 2.0)],
        );
        assert_eq!(
            resolve(&var, InputValue::new(2.0)).unwrap(),
            ResolvedValue::Categorical {
                code: "2".into(),
                points: Some(2.0)
            }
        );
    }

    #[test]
    fn test_invalid_categorical() {
        let err = resolve(&yes_no("smoker"), InputValue::new("Maybe")).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::InvalidCategoricalValue {
                variable: "smoker".into(),
                value: "Maybe".into()
            }
        );
    }

    #[test]
    fn test_analyte_conversion_uses_variable_category() {
        let value = resolve(&creatinine(), InputValue::with_unit(176.84, "µmol/L")).unwrap();
        match value {
            ResolvedValue::Numerical { value } => assert!((value - 2.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_text_number_and_decimal_comma() {
        let var = creatinine();
        assert_eq!(
            resolve(&var, InputValue::new("1,5")).unwrap(),
            ResolvedValue::Numerical { value: 1.5 }
        );
        assert_eq!(
            resolve(&var, InputValue::new("abc")).unwrap_err(),
            EvaluationError::missing("creatinine")
        );
        assert_eq!(
            resolve(&var, InputValue::new("NaN")).unwrap_err(),
            EvaluationError::missing("creatinine")
        );
    }

    #[test]
    fn test_foreign_unit_is_incompatible() {
        let err = resolve(&creatinine(), InputValue::with_unit(2.0, "kg")).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::IncompatibleUnits {
                variable: "creatinine".into(),
                from: "kg".into(),
                to: "mg/dL".into()
            }
        );
        let err = resolve(&creatinine(), InputValue::with_unit(2.0, "parsecs")).unwrap_err();
        assert!(matches!(err, EvaluationError::IncompatibleUnits { .. }));
    }

    #[test]
    fn test_bounds_checked_after_conversion() {
        let err = resolve(&creatinine(), InputValue::with_unit(2000.0, "umol/L")).unwrap_err();
        assert!(matches!(err, EvaluationError::ValueOutOfRange { max: Some(m), .. } if m == 20.0));
    }

    #[test]
    fn test_unitless_variable_with_unit() {
        let inr = Variable::numerical("inr", "INR", None);
        let lenient = resolve_value(
            &inr,
            &InputValue::with_unit(1.2, "ratio"),
            &UnitResolver::new(),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(lenient, ResolvedValue::Numerical { value: 1.2 });

        let strict = EngineConfig {
            strict_units: true,
            ..EngineConfig::default()
        };
        let value = InputValue::with_unit(1.2, "ratio");
        let err = resolve_value(&inr, &value, &UnitResolver::new(), &strict).unwrap_err();
        assert!(matches!(err, EvaluationError::IncompatibleUnits { .. }));
    }

    #[test]
    fn test_required_and_optional() {
        let vars = vec![yes_no("a"), yes_no("b")];
        let mut inputs = Inputs::new();
        inputs.insert("a".into(), InputValue::new("Yes"));

        let required: BTreeSet<String> = ["a".to_string()].into();
        let (units, config) = (UnitResolver::new(), EngineConfig::default());
        let resolved = resolve_inputs(&vars, &required, &inputs, &units, &config).unwrap();
        assert!(resolved.contains("a"));
        assert!(!resolved.contains("b"));
        assert!(resolved.flag("a").unwrap());

        let all: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
        let err = resolve_inputs(&vars, &all, &inputs, &units, &config).unwrap_err();
        assert_eq!(err, EvaluationError::missing("b"));
    }
}
