//! Variable value extraction from a clinical conversation.
//!
//! Pipeline: Variables → Schema + Prompt → Completion → Inputs + Messages

use std::collections::BTreeMap;

use medscale_core::models::{InputValue, Inputs, RawValue, Variable, VariableKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::extraction::{find_json_object, CompletionBackend, ExtractionResult};
use crate::prompts::{make_value_extraction_prompt, missing_value_message};

/// Structured-output schema: one object per variable with `value`,
/// `errorMessage` and, for numerical variables, `unit`.
pub fn value_extraction_schema(variables: &[Variable]) -> Value {
    let mut properties = Map::new();

    for variable in variables {
        let property = match &variable.kind {
            VariableKind::Categorical { options } => {
                let mut codes: Vec<Value> =
                    options.iter().map(|o| Value::from(o.value.clone())).collect();
                codes.push(Value::Null);
                json!({
                    "type": "object",
                    "properties": {
                        "value": {"type": ["string", "null"], "enum": codes},
                        "errorMessage": {"type": ["string", "null"]}
                    },
                    "required": ["value", "errorMessage"]
                })
            }
            VariableKind::Numerical { possible_units, .. } => {
                let mut units: Vec<Value> =
                    possible_units.iter().map(|u| Value::from(u.clone())).collect();
                units.push(Value::Null);
                json!({
                    "type": "object",
                    "properties": {
                        "value": {"type": ["number", "null"]},
                        "unit": {"type": ["string", "null"], "enum": units},
                        "errorMessage": {"type": ["string", "null"]}
                    },
                    "required": ["value", "unit", "errorMessage"]
                })
            }
        };
        properties.insert(variable.name.clone(), property);
    }

    json!({"type": "object", "properties": properties})
}

/// One variable as returned by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedValue {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// Values ready for evaluation plus messages for what could not be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueExtraction {
    pub inputs: Inputs,
    /// Variable name → message for the clinician
    pub messages: BTreeMap<String, String>,
}

/// Parse a structured completion against the requested variables.
///
/// Missing or null values get the model's message, or a default one in
/// `language`. Units outside a variable's possible units are dropped with
/// a message; conversion itself happens in the evaluator.
pub fn parse_value_extraction(
    text: &str,
    variables: &[Variable],
    language: &str,
) -> ExtractionResult<ValueExtraction> {
    let mut extracted: BTreeMap<String, ExtractedValue> =
        serde_json::from_str(find_json_object(text)?)?;
    let mut result = ValueExtraction::default();

    for variable in variables {
        let entry = extracted.remove(&variable.name).unwrap_or_default();
        let missing = || {
            entry
                .error_message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| missing_value_message(language, variable))
        };

        let Some(raw) = entry.value.as_ref().and_then(raw_value) else {
            result.messages.insert(variable.name.clone(), missing());
            continue;
        };

        let unit = match &variable.kind {
            VariableKind::Categorical { .. } => None,
            VariableKind::Numerical { possible_units, .. } => {
                let unit = entry.unit.clone().filter(|u| !u.trim().is_empty());
                if let Some(unit) = &unit {
                    let known = possible_units.is_empty()
                        || possible_units.iter().any(|p| p.eq_ignore_ascii_case(unit));
                    if !known {
                        tracing::warn!(
                            variable = %variable.name,
                            unit = %unit,
                            "Extracted unit is not allowed"
                        );
                        let message = format!("Invalid unit '{}' for {}", unit, variable.name);
                        result.messages.insert(variable.name.clone(), message);
                        continue;
                    }
                }
                unit
            }
        };

        result.inputs.insert(
            variable.name.clone(),
            InputValue {
                value: Some(raw),
                unit,
            },
        );
    }

    Ok(result)
}

fn raw_value(value: &Value) -> Option<RawValue> {
    match value {
        Value::Number(n) => n.as_f64().map(RawValue::Number),
        Value::String(s) if !s.trim().is_empty() => Some(RawValue::Text(s.clone())),
        Value::Bool(b) => Some(RawValue::Bool(*b)),
        _ => None,
    }
}

/// Prompt the backend for values and parse its answer.
pub fn extract_values<B: CompletionBackend>(
    backend: &B,
    variables: &[Variable],
    context: &str,
    language: &str,
) -> ExtractionResult<ValueExtraction> {
    let schema = value_extraction_schema(variables);
    let prompt = format!(
        "{}\n\nJSON SCHEMA:\n{}",
        make_value_extraction_prompt(variables, context, language),
        serde_json::to_string_pretty(&schema)?
    );
    let completion = backend.complete(&prompt)?;
    let extraction = parse_value_extraction(&completion, variables, language)?;
    tracing::debug!(
        found = extraction.inputs.len(),
        missing = extraction.messages.len(),
        "Extracted variable values"
    );
    Ok(extraction)
}
