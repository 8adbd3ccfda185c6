//! Scoring rule evaluation.
//!
//! Pipeline: Input Resolution → Rule Dispatch → Interpretation

mod formula;
mod inputs;
mod points;

pub use formula::*;
pub use inputs::*;
pub use points::*;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::interpretation::interpret;
use crate::models::{
    CalculationResult, EvaluationRequest, InterpretationTable, Inputs, ScoringRule, Scale, Variable,
    VariableContribution,
};
use crate::reference::{get_reference_scale, ReferenceScale};
use crate::units::UnitResolver;

/// Evaluation errors. Serialized with an `error` tag.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error")]
pub enum EvaluationError {
    #[error("Missing required input: {variable}")]
    MissingRequiredInput { variable: String },

    #[error("Invalid value '{value}' for {variable}")]
    InvalidCategoricalValue { variable: String, value: String },

    #[error("Cannot convert {variable} from '{from}' to '{to}'")]
    IncompatibleUnits {
        variable: String,
        from: String,
        to: String,
    },

    #[error("Value {value} for {variable} is outside [{min:?}, {max:?}]")]
    ValueOutOfRange {
        variable: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("Formula evaluation failed in '{expression}': {reason}")]
    FormulaEvaluationError { expression: String, reason: String },

    #[error("Unknown scale: {code_name}")]
    UnknownScale { code_name: String },
}

impl EvaluationError {
    pub fn missing(variable: &str) -> Self {
        Self::MissingRequiredInput {
            variable: variable.to_string(),
        }
    }

    fn formula(source: &str, err: FormulaError) -> Self {
        let expression = match &err {
            FormulaError::DivisionByZero { expression }
            | FormulaError::Domain { expression, .. }
            | FormulaError::NonFinite { expression } => expression.clone(),
            _ => source.to_string(),
        };
        Self::FormulaEvaluationError {
            expression,
            reason: err.to_string(),
        }
    }
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Raw score before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    /// Bucket label for piecewise rules
    pub category: Option<String>,
    pub breakdown: Vec<VariableContribution>,
}

/// Scale evaluator: resolves inputs, dispatches on the rule, interprets.
pub struct Evaluator {
    units: UnitResolver,
    config: EngineConfig,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Create an evaluator with default settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            units: UnitResolver::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn units(&self) -> &UnitResolver {
        &self.units
    }

    /// Resolve inputs for a set of variables.
    pub fn resolve(
        &self,
        variables: &[Variable],
        required: &BTreeSet<String>,
        inputs: &Inputs,
    ) -> EvaluationResult<ResolvedInputs> {
        resolve_inputs(variables, required, inputs, &self.units, &self.config)
    }

    /// Compute a score. No presentation rounding is applied.
    pub fn evaluate(
        &self,
        rule: &ScoringRule,
        variables: &[Variable],
        inputs: &Inputs,
    ) -> EvaluationResult<Score> {
        tracing::debug!(rule = rule.kind_name(), variables = variables.len(), "Evaluating rule");

        match rule {
            ScoringRule::SumOfPoints => {
                let required = variables.iter().map(|v| v.name.clone()).collect();
                let resolved = self.resolve(variables, &required, inputs)?;
                let (value, breakdown) = sum_of_points(variables, &resolved);
                Ok(Score {
                    value,
                    category: None,
                    breakdown,
                })
            }
            ScoringRule::Formula { expression } => {
                self.evaluate_formula(expression, variables, inputs)
            }
            ScoringRule::PiecewiseRange { input, buckets } => {
                let value = self.piecewise_input(input, variables, inputs)?;
                let bucket = find_bucket(buckets, value);
                Ok(Score {
                    value: bucket.map_or(0.0, |b| b.representative()),
                    category: bucket.map(|b| b.label.clone()),
                    breakdown: vec![VariableContribution {
                        variable: input.clone(),
                        value: value.to_string(),
                        contribution: value,
                    }],
                })
            }
        }
    }

    fn evaluate_formula(
        &self,
        expression: &str,
        variables: &[Variable],
        inputs: &Inputs,
    ) -> EvaluationResult<Score> {
        let formula =
            Formula::parse(expression).map_err(|e| EvaluationError::formula(expression, e))?;
        let identifiers = formula.identifiers();

        let declared: BTreeSet<String> = variables.iter().map(|v| v.name.clone()).collect();
        let required: BTreeSet<String> = identifiers.intersection(&declared).cloned().collect();
        for name in identifiers.difference(&declared) {
            tracing::warn!(
                variable = %name,
                expression,
                "Formula references an undeclared name; using 0"
            );
        }

        let resolved = self.resolve(variables, &required, inputs)?;
        let value = formula
            .evaluate(|name| resolved.get(name).and_then(ResolvedValue::as_number).unwrap_or(0.0))
            .map_err(|e| EvaluationError::formula(expression, e))?;

        let breakdown = variables
            .iter()
            .filter(|v| identifiers.contains(&v.name))
            .filter_map(|v| {
                resolved.get(&v.name).map(|r| VariableContribution {
                    variable: v.name.clone(),
                    value: r.display(),
                    contribution: r.as_number().unwrap_or(0.0),
                })
            })
            .collect();

        Ok(Score {
            value,
            category: None,
            breakdown,
        })
    }

    fn piecewise_input(
        &self,
        input: &str,
        variables: &[Variable],
        inputs: &Inputs,
    ) -> EvaluationResult<f64> {
        if let Some(variable) = variables.iter().find(|v| v.name == input) {
            let required = BTreeSet::from([input.to_string()]);
            let resolved = self.resolve(std::slice::from_ref(variable), &required, inputs)?;
            return resolved.number(input);
        }

        tracing::warn!(variable = input, "Piecewise input is not declared; reading raw number");
        let raw = inputs
            .get(input)
            .and_then(|i| i.value.as_ref())
            .ok_or_else(|| EvaluationError::missing(input))?;
        match raw {
            crate::models::RawValue::Number(n) if n.is_finite() => Ok(*n),
            crate::models::RawValue::Text(t) => t
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| EvaluationError::missing(input)),
            _ => Err(EvaluationError::missing(input)),
        }
    }

    /// Score and interpret.
    fn finish(
        &self,
        score: Score,
        table: &InterpretationTable,
        language: &str,
    ) -> CalculationResult {
        let interpretation = interpret(score.value, table, language, &self.config);
        CalculationResult {
            score: score.value,
            category: score.category.or(interpretation.range),
            interpretation: interpretation.meaning,
            recommendation: interpretation.recommendation,
            breakdown: score.breakdown,
            details: Default::default(),
        }
    }

    fn language<'a>(&'a self, language: &'a str) -> &'a str {
        if language.trim().is_empty() {
            &self.config.default_language
        } else {
            language
        }
    }

    /// Evaluate a self-contained request.
    pub fn evaluate_request(
        &self,
        request: &EvaluationRequest,
    ) -> EvaluationResult<CalculationResult> {
        let score = self.evaluate(&request.rule, &request.variables, &request.inputs)?;
        Ok(self.finish(score, &request.interpretation, self.language(&request.language)))
    }

    /// Evaluate a scale against variable definitions. Every variable the
    /// scale names needs a definition.
    pub fn evaluate_scale(
        &self,
        scale: &Scale,
        definitions: &[Variable],
        inputs: &Inputs,
        language: &str,
    ) -> EvaluationResult<CalculationResult> {
        let variables = scale
            .variables
            .iter()
            .map(|name| {
                definitions
                    .iter()
                    .find(|v| &v.name == name)
                    .cloned()
                    .ok_or_else(|| EvaluationError::missing(name))
            })
            .collect::<EvaluationResult<Vec<Variable>>>()?;

        let score = self.evaluate(&scale.rule, &variables, inputs)?;
        Ok(self.finish(score, &scale.interpretation, self.language(language)))
    }

    /// Evaluate a built-in reference scale through its coded calculation.
    pub fn evaluate_reference(
        &self,
        code_name: &str,
        inputs: &Inputs,
        language: &str,
    ) -> EvaluationResult<CalculationResult> {
        let scale = get_reference_scale(code_name).ok_or_else(|| EvaluationError::UnknownScale {
            code_name: code_name.to_string(),
        })?;
        self.evaluate_reference_scale(scale.as_ref(), inputs, language)
    }

    /// Evaluate a reference scale instance.
    pub fn evaluate_reference_scale(
        &self,
        scale: &dyn ReferenceScale,
        inputs: &Inputs,
        language: &str,
    ) -> EvaluationResult<CalculationResult> {
        let variables = scale.variables();
        let required = variables.iter().map(|v| v.name.clone()).collect();
        let resolved = self.resolve(&variables, &required, inputs)?;
        let outcome = scale.calculate(&resolved)?;
        tracing::debug!(
            scale = scale.code_name(),
            score = outcome.score,
            language,
            "Reference scale evaluated"
        );

        let breakdown = variables
            .iter()
            .filter_map(|v| {
                resolved.get(&v.name).map(|r| VariableContribution {
                    variable: v.name.clone(),
                    value: r.display(),
                    contribution: r.as_number().unwrap_or(0.0),
                })
            })
            .collect();

        Ok(CalculationResult {
            score: outcome.score,
            category: outcome.category,
            interpretation: outcome.interpretation,
            recommendation: outcome.recommendation,
            breakdown,
            details: outcome.details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoricalOption, InputValue, InterpretationEntry, RangeBucket};

    fn yes_no(name: &str, points: f64) -> Variable {
        Variable::categorical(
            name,
            name,
            vec![CategoricalOption::new("No", 0.0), CategoricalOption::new("Yes", points)],
        )
    }

    fn inputs(pairs: &[(&str, InputValue)]) -> Inputs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_sum_of_points_all_zero() {
        let vars = vec![yes_no("a", 1.0), yes_no("b", 2.0), yes_no("c", 3.0)];
        let input = inputs(&[
            ("a", InputValue::new("No")),
            ("b", InputValue::new("No")),
            ("c", InputValue::new("No")),
        ]);
        let score = Evaluator::new().evaluate(&ScoringRule::SumOfPoints, &vars, &input).unwrap();
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn test_oversized_formula_is_an_error() {
        let vars = vec![Variable::numerical("a", "a", None)];
        let rule = ScoringRule::formula(vec!["a"; 5000].join(" + "));
        let err = Evaluator::new()
            .evaluate(&rule, &vars, &inputs(&[("a", InputValue::new(1.0))]))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::FormulaEvaluationError { .. }));
    }

    #[test]
    fn test_sum_requires_every_variable() {
        let vars = vec![yes_no("a", 1.0), yes_no("b", 2.0)];
        let input = inputs(&[("a", InputValue::new("Yes"))]);
        let err = Evaluator::new().evaluate(&ScoringRule::SumOfPoints, &vars, &input).unwrap_err();
        assert_eq!(err, EvaluationError::missing("b"));
    }

    #[test]
    fn test_formula_with_categorical_points() {
        let vars = vec![
            Variable::numerical("weight", "Body weight", Some("kg")),
            Variable::categorical(
                "sex",
                "Sex",
                vec![CategoricalOption::new("male", 1.0), CategoricalOption::new("female", 0.85)],
            ),
        ];
        let input = inputs(&[
            ("weight", InputValue::with_unit(220.46226218, "lb")),
            ("sex", InputValue::new("female")),
        ]);
        let score = Evaluator::new()
            .evaluate(&ScoringRule::formula("weight * sex"), &vars, &input)
            .unwrap();
        assert!((score.value - 85.0).abs() < 1e-6);
        assert_eq!(score.breakdown.len(), 2);
    }

    #[test]
    fn test_formula_undeclared_name_is_zero() {
        let vars = vec![Variable::numerical("a", "A", None)];
        let input = inputs(&[("a", InputValue::new(2.0))]);
        let score = Evaluator::new()
            .evaluate(&ScoringRule::formula("a + ghost * 10"), &vars, &input)
            .unwrap();
        assert_eq!(score.value, 2.0);
    }

    #[test]
    fn test_formula_only_requires_referenced_names() {
        let vars = vec![
            Variable::numerical("a", "A", None),
            Variable::numerical("unused", "U", None),
        ];
        let input = inputs(&[("a", InputValue::new(3.0))]);
        let score = Evaluator::new()
            .evaluate(&ScoringRule::formula("a * 2"), &vars, &input)
            .unwrap();
        assert_eq!(score.value, 6.0);
    }

    #[test]
    fn test_formula_errors_are_typed() {
        let vars = vec![Variable::numerical("a", "A", None), Variable::numerical("b", "B", None)];
        let input = inputs(&[("a", InputValue::new(1.0)), ("b", InputValue::new(0.0))]);
        let err = Evaluator::new()
            .evaluate(&ScoringRule::formula("1 + a / b"), &vars, &input)
            .unwrap_err();
        match err {
            EvaluationError::FormulaEvaluationError { expression, .. } => {
                assert_eq!(expression, "a / b")
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = Evaluator::new()
            .evaluate(&ScoringRule::formula("a +"), &vars, &input)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::FormulaEvaluationError { ref expression, .. } if expression == "a +"
        ));
    }

    #[test]
    fn test_piecewise_midpoint_and_miss() {
        let vars = vec![Variable::numerical("age", "Age", Some("year"))];
        let rule = ScoringRule::PiecewiseRange {
            input: "age".into(),
            buckets: vec![
                RangeBucket::new(None, Some(44.0), "young"),
                RangeBucket::new(Some(45.0), Some(64.0), "middle"),
                RangeBucket::new(Some(65.0), None, "old"),
            ],
        };
        let eval = Evaluator::new();

        let score = eval
            .evaluate(&rule, &vars, &inputs(&[("age", InputValue::new(50.0))]))
            .unwrap();
        assert_eq!(score.value, 54.5);
        assert_eq!(score.category.as_deref(), Some("middle"));

        let score = eval
            .evaluate(&rule, &vars, &inputs(&[("age", InputValue::new(80.0))]))
            .unwrap();
        assert_eq!(score.value, 65.0);

        let score = eval
            .evaluate(&rule, &vars, &inputs(&[("age", InputValue::new(44.5))]))
            .unwrap();
        assert_eq!(score.value, 0.0);
        assert_eq!(score.category, None);
    }

    #[test]
    fn test_request_round_trip_with_interpretation() {
        let request = EvaluationRequest {
            rule: ScoringRule::SumOfPoints,
            variables: vec![yes_no("a", 1.0), yes_no("b", 1.0)],
            inputs: inputs(&[("a", InputValue::new("Yes")), ("b", InputValue::new("Yes"))]),
            language: "en".into(),
            interpretation: InterpretationTable::english(vec![
                InterpretationEntry::new("0-1", "Low", "Observe"),
                InterpretationEntry::new("2+", "High", "Treat"),
            ]),
        };
        let result = Evaluator::new().evaluate_request(&request).unwrap();
        assert_eq!(result.score, 2.0);
        assert_eq!(result.interpretation, "High");
        assert_eq!(result.recommendation, "Treat");
        assert_eq!(result.category.as_deref(), Some("2+"));
    }

    #[test]
    fn test_error_serializes_with_tag() {
        let json = serde_json::to_value(EvaluationError::missing("age")).unwrap();
        assert_eq!(json["error"], "MissingRequiredInput");
        assert_eq!(json["variable"], "age");
    }

    #[test]
    fn test_unknown_reference_scale() {
        let err = Evaluator::new()
            .evaluate_reference("nonexistent", &Inputs::new(), "en")
            .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::UnknownScale {
                code_name: "nonexistent".into()
            }
        );
    }

    #[test]
    fn test_scale_without_definition() {
        let scale = Scale::new(
            "demo",
            Default::default(),
            vec!["a".into(), "b".into()],
            ScoringRule::SumOfPoints,
        );
        let err = Evaluator::new()
            .evaluate_scale(&scale, &[yes_no("a", 1.0)], &Inputs::new(), "en")
            .unwrap_err();
        assert_eq!(err, EvaluationError::missing("b"));
    }
}
