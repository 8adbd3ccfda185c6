//! Medscale Core Library
//!
//! Clinical scale evaluation: named inputs plus a scoring rule become a
//! score, a risk category and a recommendation.
//!
//! # Architecture
//!
//! ```text
//! free text / known name
//!         │
//!         ├── Reference Library (coded, test-vector validated)
//!         └── Extraction draft (LLM, external) ──► ScaleDraft
//!                                                     │
//!                                       rule + variable definitions
//!                                                     │
//!                 raw values + units ──► Unit Resolver (normalize)
//!                                                     │
//!                                     Scoring Rule Evaluator
//!                         (sum of points | formula | piecewise range)
//!                                                     │
//!                                   Interpretation Resolver
//!                                                     │
//!                             CalculationResult ──► SQLite (upsert)
//! ```
//!
//! # Modules
//!
//! - [`units`]: measurement categories, unit aliases and conversion
//! - [`engine`]: input resolution, formula grammar, rule dispatch
//! - [`interpretation`]: range parsing and language fallback
//! - [`reference`]: built-in validated scales
//! - [`db`]: SQLite persistence with FTS5 search
//! - [`pipeline`]: several scales over one input map
//! - [`models`]: domain types (Scale, Variable, ScoringRule, ScaleDraft)
//! - [`config`]: engine settings

pub mod config;
pub mod db;
pub mod engine;
pub mod interpretation;
pub mod models;
pub mod pipeline;
pub mod reference;
pub mod units;

// Re-export commonly used types
pub use config::EngineConfig;
pub use db::{Database, ScaleDocument, UpsertOutcome, VariableDocument};
pub use engine::{EvaluationError, Evaluator, Formula};
pub use models::{
    CalculationResult, EvaluationRequest, InputValue, Inputs, Scale, ScaleDraft, ScoringRule,
    Variable,
};
pub use pipeline::{PipelineReport, ScalePipeline};
pub use reference::{all_reference_scales, get_reference_scale, ReferenceScale};
pub use units::{MeasurementCategory, UnitResolver};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MedscaleError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Carries the tagged JSON form of the evaluation error
    #[error("Evaluation error: {0}")]
    EvaluationError(String),
}

impl From<db::DbError> for MedscaleError {
    fn from(e: db::DbError) -> Self {
        MedscaleError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for MedscaleError {
    fn from(e: serde_json::Error) -> Self {
        MedscaleError::SerializationError(e.to_string())
    }
}

impl From<engine::EvaluationError> for MedscaleError {
    fn from(e: engine::EvaluationError) -> Self {
        let tagged = serde_json::to_string(&e).unwrap_or_else(|_| e.to_string());
        MedscaleError::EvaluationError(tagged)
    }
}

impl From<models::DraftError> for MedscaleError {
    fn from(e: models::DraftError) -> Self {
        MedscaleError::InvalidInput(e.to_string())
    }
}

impl From<config::ConfigError> for MedscaleError {
    fn from(e: config::ConfigError) -> Self {
        MedscaleError::InvalidInput(e.to_string())
    }
}

impl From<pipeline::PipelineError> for MedscaleError {
    fn from(e: pipeline::PipelineError) -> Self {
        MedscaleError::DatabaseError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedscaleError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedscaleError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<MedscaleCore>, MedscaleError> {
    let db = Database::open(&path)?;
    Ok(MedscaleCore::wrap(db, Evaluator::new()))
}

/// Open a database with an engine configuration given as JSON.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<MedscaleCore>, MedscaleError> {
    let config = EngineConfig::from_json_str(&config_json)?;
    let db = Database::open(&path)?;
    Ok(MedscaleCore::wrap(db, Evaluator::with_config(config)))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<MedscaleCore>, MedscaleError> {
    let db = Database::open_in_memory()?;
    Ok(MedscaleCore::wrap(db, Evaluator::new()))
}

/// Evaluate a self-contained request (`{rule, variables, inputs, language,
/// interpretation}`) and return the result as JSON.
#[uniffi::export]
pub fn evaluate_json(request_json: String) -> Result<String, MedscaleError> {
    let request: EvaluationRequest = serde_json::from_str(&request_json)?;
    let result = Evaluator::new().evaluate_request(&request)?;
    Ok(serde_json::to_string(&result)?)
}

/// Built-in reference scales.
#[uniffi::export]
pub fn list_reference_scales() -> Vec<FfiReferenceScale> {
    all_reference_scales()
        .iter()
        .map(|s| FfiReferenceScale::from_reference(s.as_ref()))
        .collect()
}

/// Closest reference scale to a free-text name, if any is similar enough.
#[uniffi::export]
pub fn suggest_reference_scale(name: String) -> Option<FfiReferenceScale> {
    reference::find_closest(&name)
        .map(|(scale, _)| FfiReferenceScale::from_reference(scale.as_ref()))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database and evaluator wrapper for FFI.
#[derive(uniffi::Object)]
pub struct MedscaleCore {
    db: Arc<Mutex<Database>>,
    evaluator: Evaluator,
}

impl MedscaleCore {
    fn wrap(db: Database, evaluator: Evaluator) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            evaluator,
        })
    }
}

#[uniffi::export]
impl MedscaleCore {
    // =========================================================================
    // Scale Operations
    // =========================================================================

    /// Add or update a scale given as `Scale` JSON.
    pub fn upsert_scale_json(&self, scale_json: String) -> Result<FfiUpsertOutcome, MedscaleError> {
        let mut scale: Scale = serde_json::from_str(&scale_json)?;
        scale.code_name = models::normalize_code_name(&scale.code_name);
        if scale.code_name.is_empty() {
            return Err(MedscaleError::InvalidInput("Scale code name is empty".into()));
        }
        let db = self.db.lock()?;
        Ok(db.upsert_scale(&scale)?.into())
    }

    /// Validate an extraction draft and persist the scale with its variables.
    pub fn upsert_draft_json(&self, draft_json: String) -> Result<FfiUpsertOutcome, MedscaleError> {
        let draft: ScaleDraft = serde_json::from_str(&draft_json)?;
        let (scale, variables) = draft.into_scale_and_variables(self.evaluator.units())?;
        let db = self.db.lock()?;
        Ok(db.store_scale(&scale, &variables)?.into())
    }

    /// Persisted scale document as JSON.
    pub fn get_scale_json(&self, code_name: String) -> Result<Option<String>, MedscaleError> {
        let db = self.db.lock()?;
        match db.get_scale_record(&models::normalize_code_name(&code_name))? {
            Some(record) => Ok(Some(serde_json::to_string(&record.to_document()?)?)),
            None => Ok(None),
        }
    }

    /// Search scales by name or description.
    pub fn search_scales(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiScaleSummary>, MedscaleError> {
        let db = self.db.lock()?;
        let scales = db.search_scales(&query, limit as usize)?;
        Ok(scales.into_iter().map(|s| FfiScaleSummary::from_scale(&s, "en")).collect())
    }

    /// Delete a scale. Returns false if it did not exist.
    pub fn delete_scale(&self, code_name: String) -> Result<bool, MedscaleError> {
        let db = self.db.lock()?;
        Ok(db.delete_scale(&models::normalize_code_name(&code_name))?)
    }

    /// Persist a reference scale that has a generic rule, plus its
    /// variables. Reference scales agree on every variable name they share.
    pub fn install_reference_scale(
        &self,
        code_name: String,
    ) -> Result<FfiUpsertOutcome, MedscaleError> {
        let reference = get_reference_scale(&code_name).ok_or_else(|| {
            MedscaleError::from(EvaluationError::UnknownScale {
                code_name: code_name.clone(),
            })
        })?;
        let scale = reference.to_scale().ok_or_else(|| {
            MedscaleError::InvalidInput(format!("{} has no generic rule", reference.code_name()))
        })?;

        let db = self.db.lock()?;
        Ok(db.store_scale(&scale, &reference.variables())?.into())
    }

    // =========================================================================
    // Variable Operations
    // =========================================================================

    /// Add or update a variable given as `Variable` JSON.
    pub fn upsert_variable_json(&self, variable_json: String) -> Result<bool, MedscaleError> {
        let mut variable: Variable = serde_json::from_str(&variable_json)?;
        variable.name = models::normalize_code_name(&variable.name);
        if variable.name.is_empty() {
            return Err(MedscaleError::InvalidInput("Variable name is empty".into()));
        }
        let db = self.db.lock()?;
        Ok(db.upsert_variable(&variable)?)
    }

    /// Persisted variable document as JSON.
    pub fn get_variable_json(&self, name: String) -> Result<Option<String>, MedscaleError> {
        let db = self.db.lock()?;
        match db.get_variable(&models::normalize_code_name(&name))? {
            Some(variable) => Ok(Some(serde_json::to_string(&VariableDocument::from(&variable))?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Calculation Operations
    // =========================================================================

    /// Evaluate several scales over one input set. Returns the report as JSON;
    /// per-scale failures are inside the report.
    pub fn calculate_scales(
        &self,
        code_names: Vec<String>,
        inputs: Vec<FfiInput>,
        language: String,
    ) -> Result<String, MedscaleError> {
        let db = self.db.lock()?;
        let pipeline = ScalePipeline::new(&db, &self.evaluator);
        let report = pipeline.calculate(&code_names, &to_inputs(inputs), &language)?;
        Ok(serde_json::to_string(&report)?)
    }

    /// Evaluate a built-in reference scale through its coded calculation.
    pub fn calculate_reference(
        &self,
        code_name: String,
        inputs: Vec<FfiInput>,
        language: String,
    ) -> Result<FfiCalculationResult, MedscaleError> {
        let result = self
            .evaluator
            .evaluate_reference(&code_name, &to_inputs(inputs), &language)?;
        Ok(result.into())
    }
}

fn to_inputs(inputs: Vec<FfiInput>) -> Inputs {
    inputs
        .into_iter()
        .map(|input| {
            let value = InputValue {
                value: Some(models::RawValue::Text(input.value)),
                unit: input.unit,
            };
            (input.name, value)
        })
        .collect()
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe input value. Numbers and booleans are passed as text.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInput {
    pub name: String,
    pub value: String,
    pub unit: Option<String>,
}

/// FFI-safe upsert outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUpsertOutcome {
    pub created: bool,
    pub version: u32,
}

impl From<UpsertOutcome> for FfiUpsertOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        Self {
            created: outcome.created,
            version: outcome.version,
        }
    }
}

/// FFI-safe calculation result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCalculationResult {
    pub score: f64,
    pub category: Option<String>,
    pub interpretation: String,
    pub recommendation: String,
}

impl From<CalculationResult> for FfiCalculationResult {
    fn from(result: CalculationResult) -> Self {
        Self {
            score: result.score,
            category: result.category,
            interpretation: result.interpretation,
            recommendation: result.recommendation,
        }
    }
}

/// FFI-safe scale summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScaleSummary {
    pub code_name: String,
    pub name: String,
    pub description: String,
    pub version: u32,
}

impl FfiScaleSummary {
    fn from_scale(scale: &Scale, language: &str) -> Self {
        Self {
            code_name: scale.code_name.clone(),
            name: scale.display_name(language),
            description: scale.description.clone(),
            version: scale.version,
        }
    }
}

/// FFI-safe reference scale descriptor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReferenceScale {
    pub code_name: String,
    pub name: String,
    pub description: String,
    pub reference: String,
    pub variables: Vec<String>,
    /// Whether the scale can also run through the generic evaluator
    pub has_generic_rule: bool,
}

impl FfiReferenceScale {
    fn from_reference(scale: &dyn ReferenceScale) -> Self {
        Self {
            code_name: scale.code_name().to_string(),
            name: scale.name().get("en").unwrap_or_default().to_string(),
            description: scale.description().to_string(),
            reference: scale.reference().to_string(),
            variables: scale.variables().into_iter().map(|v| v.name).collect(),
            has_generic_rule: scale.generic_rule().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, value: &str) -> FfiInput {
        FfiInput {
            name: name.into(),
            value: value.into(),
            unit: None,
        }
    }

    #[test]
    fn test_install_and_calculate() {
        let core = open_database_in_memory().unwrap();
        assert!(core.install_reference_scale("CURB-65".into()).unwrap().created);
        assert!(matches!(
            core.install_reference_scale("prevent".into()),
            Err(MedscaleError::InvalidInput(_))
        ));

        let inputs = ["confusion", "bun", "rr", "bp", "age_65_or_older"]
            .iter()
            .map(|n| input(n, "yes"))
            .collect();
        let report = core
            .calculate_scales(vec!["curb_65".into()], inputs, "en".into())
            .unwrap();
        let report: PipelineReport = serde_json::from_str(&report).unwrap();
        assert_eq!(report.outcomes[0].source, pipeline::ScaleSource::Stored);
        let result = report.outcomes[0].result.as_ref().unwrap();
        assert_eq!(result.score, 5.0);
        assert_eq!(result.recommendation, "ICU admission");
    }

    #[test]
    fn test_variable_names_are_normalized() {
        let core = open_database_in_memory().unwrap();
        let variable = r#"{"name": "Serum Sodium", "kind": {"type": "numerical", "standard_unit": "mEq/L"}}"#;
        assert!(core.upsert_variable_json(variable.into()).unwrap());

        let stored = core.get_variable_json("SERUM-sodium".into()).unwrap().unwrap();
        let stored: VariableDocument = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.name, "serum_sodium");
        assert!(core.get_variable_json("serum_sodium".into()).unwrap().is_some());

        assert!(matches!(
            core.upsert_variable_json(r#"{"name": "--", "kind": {"type": "numerical"}}"#.into()),
            Err(MedscaleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_calculate_reference() {
        let core = open_database_in_memory().unwrap();
        let inputs = vec![
            input("age", "65"),
            input("sex", "male"),
            FfiInput {
                name: "weight".into(),
                value: "80".into(),
                unit: Some("kg".into()),
            },
            input("creatinine", "2.0"),
        ];
        let result = core
            .calculate_reference("cockcroft_gault".into(), inputs, "en".into())
            .unwrap();
        assert!((result.score - 41.6667).abs() < 0.001);
        assert_eq!(result.interpretation, "Kidney function: Moderately decreased");
    }

    #[test]
    fn test_evaluation_error_is_tagged_json() {
        let core = open_database_in_memory().unwrap();
        let err = core
            .calculate_reference("curb_65".into(), vec![], "en".into())
            .unwrap_err();
        match err {
            MedscaleError::EvaluationError(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["error"], "MissingRequiredInput");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_draft_round_trip() {
        let core = open_database_in_memory().unwrap();
        let draft = r#"{
            "scale_name": "Toy Score",
            "calculationType": "sum",
            "variables": [{"name": "fever", "type": "select",
                           "options": [{"value": "No", "points": 0}, {"value": "Yes", "points": 2}]}]
        }"#;
        let outcome = core.upsert_draft_json(draft.into()).unwrap();
        assert!(outcome.created);

        let document = core.get_scale_json("Toy Score".into()).unwrap().unwrap();
        let document: ScaleDocument = serde_json::from_str(&document).unwrap();
        assert_eq!(document.code_name, "toy_score");
        assert!(core.get_variable_json("fever".into()).unwrap().is_some());
        assert_eq!(core.search_scales("toy".into(), 5).unwrap().len(), 1);
    }

    #[test]
    fn test_evaluate_json() {
        let request = r#"{
            "rule": {"type": "formula", "expression": "weight / (height ^ 2)"},
            "variables": [
                {"name": "weight", "kind": {"type": "numerical", "standard_unit": "kg"}},
                {"name": "height", "kind": {"type": "numerical", "standard_unit": "m"}}
            ],
            "inputs": {"weight": {"value": 80}, "height": {"value": 200, "unit": "cm"}}
        }"#;
        let json = evaluate_json(request.into()).unwrap();
        let result: CalculationResult = serde_json::from_str(&json).unwrap();
        assert!((result.score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_listing() {
        let scales = list_reference_scales();
        assert_eq!(scales.len(), 6);
        assert!(!scales.iter().find(|s| s.code_name == "prevent").unwrap().has_generic_rule);
        let suggestion = suggest_reference_scale("Cockcroft Gault".into()).unwrap();
        assert_eq!(suggestion.code_name, "cockcroft_gault");
    }
}
