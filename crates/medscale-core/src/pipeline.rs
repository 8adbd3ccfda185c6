//! Multi-scale calculation over one shared input map.
//!
//! Pipeline: Load Scales → Load Variables → Evaluate Each → Report
//!
//! A failure on one scale is recorded on its outcome and never stops the
//! others. Database errors abort the whole run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::engine::{EvaluationError, Evaluator};
use crate::models::{normalize_code_name, CalculationResult, Inputs, Scale, Variable};
use crate::reference::{get_reference_scale, ReferenceScale};

/// Pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Where a scale definition came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSource {
    Stored,
    Reference,
    Unknown,
}

/// Result for one requested scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleOutcome {
    pub code_name: String,
    /// Display name in the requested language
    pub scale_name: Option<String>,
    pub source: ScaleSource,
    pub result: Option<CalculationResult>,
    pub error: Option<EvaluationError>,
}

/// Outcomes for every requested scale, in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub outcomes: Vec<ScaleOutcome>,
    /// Variable name → code names of the scales that use it
    pub variables_to_scales: BTreeMap<String, Vec<String>>,
    /// Variables named by stored scales but not defined in the database
    pub missing_variable_definitions: Vec<String>,
}

impl PipelineReport {
    pub fn successful(&self) -> impl Iterator<Item = &ScaleOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_some())
    }
}

enum Loaded {
    Stored(Scale),
    Reference(Box<dyn ReferenceScale>),
    Unknown,
}

/// Coordinates loading and evaluating several scales.
pub struct ScalePipeline<'a> {
    db: &'a Database,
    evaluator: &'a Evaluator,
}

impl<'a> ScalePipeline<'a> {
    pub fn new(db: &'a Database, evaluator: &'a Evaluator) -> Self {
        Self { db, evaluator }
    }

    /// Evaluate each scale against the shared inputs.
    ///
    /// Stored documents take precedence; otherwise the reference library
    /// is consulted.
    pub fn calculate(
        &self,
        code_names: &[String],
        inputs: &Inputs,
        language: &str,
    ) -> PipelineResult<PipelineReport> {
        let mut loaded = Vec::with_capacity(code_names.len());
        for requested in code_names {
            let code_name = normalize_code_name(requested);
            let scale = match self.db.get_scale(&code_name)? {
                Some(scale) => Loaded::Stored(scale),
                None => match get_reference_scale(&code_name) {
                    Some(reference) => Loaded::Reference(reference),
                    None => Loaded::Unknown,
                },
            };
            loaded.push((code_name, scale));
        }

        let mut variables_to_scales: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut stored_names = BTreeSet::new();
        for (code_name, scale) in &loaded {
            let names: Vec<String> = match scale {
                Loaded::Stored(scale) => {
                    stored_names.extend(scale.variables.iter().cloned());
                    scale.variables.clone()
                }
                Loaded::Reference(reference) => {
                    reference.variables().into_iter().map(|v| v.name).collect()
                }
                Loaded::Unknown => Vec::new(),
            };
            for name in names {
                let users = variables_to_scales.entry(name).or_default();
                if !users.contains(code_name) {
                    users.push(code_name.clone());
                }
            }
        }

        let stored_names: Vec<String> = stored_names.into_iter().collect();
        let definitions = self.db.get_variables(&stored_names)?;
        let missing_variable_definitions: Vec<String> = stored_names
            .into_iter()
            .filter(|name| !definitions.iter().any(|v| &v.name == name))
            .collect();
        if !missing_variable_definitions.is_empty() {
            tracing::warn!(
                missing = ?missing_variable_definitions,
                "Scales reference undefined variables"
            );
        }

        let outcomes = loaded
            .into_iter()
            .map(|(code_name, scale)| {
                self.evaluate_one(code_name, scale, &definitions, inputs, language)
            })
            .collect();

        Ok(PipelineReport {
            outcomes,
            variables_to_scales,
            missing_variable_definitions,
        })
    }

    fn evaluate_one(
        &self,
        code_name: String,
        scale: Loaded,
        definitions: &[Variable],
        inputs: &Inputs,
        language: &str,
    ) -> ScaleOutcome {
        let (scale_name, source, evaluated) = match scale {
            Loaded::Stored(scale) => (
                Some(scale.display_name(language)),
                ScaleSource::Stored,
                self.evaluator.evaluate_scale(&scale, definitions, inputs, language),
            ),
            Loaded::Reference(reference) => {
                (
                    reference.name().get(language).map(str::to_string),
                    ScaleSource::Reference,
                    self.evaluator
                        .evaluate_reference_scale(reference.as_ref(), inputs, language),
                )
            }
            Loaded::Unknown => (
                None,
                ScaleSource::Unknown,
                Err(EvaluationError::UnknownScale {
                    code_name: code_name.clone(),
                }),
            ),
        };

        match evaluated {
            Ok(result) => ScaleOutcome {
                code_name,
                scale_name,
                source,
                result: Some(result),
                error: None,
            },
            Err(error) => {
                tracing::debug!(code_name = %code_name, error = %error, "Scale evaluation failed");
                ScaleOutcome {
                    code_name,
                    scale_name,
                    source,
                    result: None,
                    error: Some(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoricalOption, InputValue, LocalizedText, ScoringRule};

    fn setup() -> (Database, Evaluator) {
        let db = Database::open_in_memory().unwrap();
        let flag = |name: &str, points: f64| {
            Variable::categorical(
                name,
                name,
                vec![CategoricalOption::new("No", 0.0), CategoricalOption::new("Yes", points)],
            )
        };
        db.upsert_variable(&flag("fever", 1.0)).unwrap();
        db.upsert_variable(&flag("cough", 2.0)).unwrap();
        db.upsert_scale(&Scale::new(
            "toy_score",
            LocalizedText::english("Toy Score").with("pt", "Escore Teste"),
            vec!["fever".into(), "cough".into()],
            ScoringRule::SumOfPoints,
        ))
        .unwrap();
        db.upsert_scale(&Scale::new(
            "needs_rash",
            LocalizedText::english("Needs Rash"),
            vec!["fever".into(), "rash".into()],
            ScoringRule::SumOfPoints,
        ))
        .unwrap();
        (db, Evaluator::new())
    }

    fn inputs(pairs: &[(&str, &str)]) -> Inputs {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), InputValue::new(*value)))
            .collect()
    }

    #[test]
    fn test_failures_stay_per_scale() {
        let (db, evaluator) = setup();
        let pipeline = ScalePipeline::new(&db, &evaluator);
        let codes = vec![
            "toy_score".to_string(),
            "needs_rash".to_string(),
            "apache_ii".to_string(),
        ];

        let report = pipeline
            .calculate(&codes, &inputs(&[("fever", "Yes"), ("cough", "Yes")]), "pt")
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        let toy = &report.outcomes[0];
        assert_eq!(toy.result.as_ref().unwrap().score, 3.0);
        assert_eq!(toy.scale_name.as_deref(), Some("Escore Teste"));

        assert_eq!(report.outcomes[1].error, Some(EvaluationError::missing("rash")));
        assert_eq!(report.outcomes[2].source, ScaleSource::Unknown);
        assert!(matches!(report.outcomes[2].error, Some(EvaluationError::UnknownScale { .. })));

        assert_eq!(report.missing_variable_definitions, vec!["rash"]);
        assert_eq!(report.variables_to_scales["fever"], vec!["toy_score", "needs_rash"]);
        assert_eq!(report.successful().count(), 1);
    }

    #[test]
    fn test_reference_fallback() {
        let (db, evaluator) = setup();
        let pipeline = ScalePipeline::new(&db, &evaluator);
        let all_yes = inputs(&[
            ("confusion", "Yes"),
            ("bun", "Yes"),
            ("rr", "Yes"),
            ("bp", "Yes"),
            ("age_65_or_older", "Yes"),
        ]);

        let report = pipeline.calculate(&["CURB-65".to_string()], &all_yes, "en").unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.code_name, "curb_65");
        assert_eq!(outcome.source, ScaleSource::Reference);
        let result = outcome.result.as_ref().unwrap();
        assert_eq!(result.score, 5.0);
        assert_eq!(result.recommendation, "ICU admission");
        assert!(report.missing_variable_definitions.is_empty());
    }
}
