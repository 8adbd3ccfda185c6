//! Prompts for scale extraction, value extraction and result interpretation.
//!
//! Chat turns use `<|system|>`/`<|user|>`/`<|assistant|>` tags so the same
//! text works with local chat-tuned models.

use std::collections::BTreeMap;

use medscale_core::models::{Variable, VariableKind};
use medscale_core::pipeline::PipelineReport;

// ============================================================================
// Scale extraction
// ============================================================================

/// System prompt for turning a free-text scale write-up into a draft.
pub const SCALE_SYSTEM_PROMPT: &str = r#"You are a clinical informatics assistant that converts descriptions of clinical scoring scales into structured JSON.

Extract:
- scale_name: The scale's common name
- description: One sentence on what the scale estimates
- reference: Literature citation, if given
- calculationType: "sum" when the score adds up option points, "formula" when it is computed from an equation
- variables: Each input, with "type" "select" (answer options with points) or "number" (with min, max and unit)
- formula: Arithmetic over variable names, only when calculationType is "formula"
- interpretation: Score ranges ("0-1", "2", ">=3", "5+") with meaning and recommendation

Use only the information in the text. Never invent cutoffs, points or recommendations.
Variable names are lowercase with underscores. Formulas may use + - * / ^, parentheses and ln, log, sqrt, exp, abs, round, min, max."#;

/// User prompt for scale extraction.
pub fn make_scale_extraction_prompt(text: &str) -> String {
    format!(
        r#"Convert this clinical scale description into JSON:

"{}"

Return one JSON object with keys scale_name, description, reference, calculationType, variables, formula, interpretation, recommendation."#,
        text
    )
}

/// GBNF grammar constraining output to the draft shape.
pub const DRAFT_JSON_GRAMMAR: &str = r#"
root ::= "{" ws
    "\"scale_name\"" ws ":" ws string ws "," ws
    "\"description\"" ws ":" ws string ws "," ws
    "\"reference\"" ws ":" ws (string | "null") ws "," ws
    "\"calculationType\"" ws ":" ws ("\"sum\"" | "\"formula\"") ws "," ws
    "\"variables\"" ws ":" ws variables ws "," ws
    "\"formula\"" ws ":" ws (string | "null") ws "," ws
    "\"interpretation\"" ws ":" ws entries ws "," ws
    "\"recommendation\"" ws ":" ws (string | "null") ws
"}"
variables ::= "[" ws (variable (ws "," ws variable)*)? ws "]"
variable ::= "{" ws
    "\"name\"" ws ":" ws string ws "," ws
    "\"type\"" ws ":" ws ("\"select\"" | "\"number\"") ws "," ws
    "\"description\"" ws ":" ws string ws "," ws
    "\"options\"" ws ":" ws options ws "," ws
    "\"min\"" ws ":" ws (number | "null") ws "," ws
    "\"max\"" ws ":" ws (number | "null") ws "," ws
    "\"unit\"" ws ":" ws (string | "null") ws
"}"
options ::= "[" ws (option (ws "," ws option)*)? ws "]"
option ::= "{" ws
    "\"value\"" ws ":" ws (string | number) ws "," ws
    "\"label\"" ws ":" ws (string | "null") ws "," ws
    "\"points\"" ws ":" ws number ws
"}"
entries ::= "[" ws (entry (ws "," ws entry)*)? ws "]"
entry ::= "{" ws
    "\"range\"" ws ":" ws string ws "," ws
    "\"meaning\"" ws ":" ws string ws "," ws
    "\"recommendation\"" ws ":" ws string ws
"}"
string ::= "\"" ([^"\\] | "\\" .)* "\""
number ::= "-"? [0-9]+ ("." [0-9]+)?
ws ::= [ \t\n]*
"#;

/// Few-shot examples for scale extraction.
pub const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    (
        "CURB-65 estimates 30-day mortality in community-acquired pneumonia (Lim WS, et al. Thorax. 2003). One point each for confusion, urea >7 mmol/L, respiratory rate >=30, low blood pressure and age >=65. 0-1: low risk, outpatient care. 2: consider admission. 3-5: severe, hospital or ICU.",
        r#"{"scale_name":"CURB-65","description":"30-day mortality in community-acquired pneumonia.","reference":"Lim WS, et al. Thorax. 2003","calculationType":"sum","variables":[{"name":"confusion","type":"select","description":"New onset confusion","options":[{"value":"No","label":null,"points":0},{"value":"Yes","label":null,"points":1}],"min":null,"max":null,"unit":null},{"name":"urea","type":"select","description":"Urea >7 mmol/L","options":[{"value":"No","label":null,"points":0},{"value":"Yes","label":null,"points":1}],"min":null,"max":null,"unit":null},{"name":"respiratory_rate","type":"select","description":"Respiratory rate >=30/min","options":[{"value":"No","label":null,"points":0},{"value":"Yes","label":null,"points":1}],"min":null,"max":null,"unit":null},{"name":"blood_pressure","type":"select","description":"Systolic <90 or diastolic <=60 mmHg","options":[{"value":"No","label":null,"points":0},{"value":"Yes","label":null,"points":1}],"min":null,"max":null,"unit":null},{"name":"age_65","type":"select","description":"Age >=65 years","options":[{"value":"No","label":null,"points":0},{"value":"Yes","label":null,"points":1}],"min":null,"max":null,"unit":null}],"formula":null,"interpretation":[{"range":"0-1","meaning":"Low risk","recommendation":"Outpatient care"},{"range":"2","meaning":"Moderate risk","recommendation":"Consider admission"},{"range":"3-5","meaning":"Severe","recommendation":"Hospital or ICU"}],"recommendation":null}"#,
    ),
];

/// Build a complete scale extraction prompt.
pub fn build_full_prompt(text: &str, include_examples: bool) -> String {
    let mut prompt = String::new();

    prompt.push_str("<|system|>\n");
    prompt.push_str(SCALE_SYSTEM_PROMPT);
    prompt.push_str("\n<|end|>\n");

    if include_examples {
        for (input, output) in FEW_SHOT_EXAMPLES {
            push_turn(&mut prompt, "user", &make_scale_extraction_prompt(input));
            push_turn(&mut prompt, "assistant", output);
        }
    }

    push_turn(&mut prompt, "user", &make_scale_extraction_prompt(text));
    prompt.push_str("<|assistant|>\n");

    prompt
}

fn push_turn(prompt: &mut String, role: &str, content: &str) {
    prompt.push_str("<|");
    prompt.push_str(role);
    prompt.push_str("|>\n");
    prompt.push_str(content);
    prompt.push_str("\n<|end|>\n");
}

// ============================================================================
// Value extraction
// ============================================================================

/// Message prefix for a value the clinician did not mention.
pub fn missing_value_prefix(language: &str) -> &'static str {
    match language {
        "pt" => "Doutor, você não mencionou",
        "es" => "Doctor, no mencionó",
        _ => "Doctor, you did not mention",
    }
}

/// Message shown for a variable missing from the conversation.
pub fn missing_value_message(language: &str, variable: &Variable) -> String {
    format!("{} {}", missing_value_prefix(language), display_name(variable, language))
}

fn display_name<'a>(variable: &'a Variable, language: &str) -> &'a str {
    variable
        .medical_name
        .get(language)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(variable.description.as_str())
}

/// Prompt asking for variable values found in a conversation.
pub fn make_value_extraction_prompt(
    variables: &[Variable],
    context: &str,
    language: &str,
) -> String {
    let described = variables
        .iter()
        .map(|v| {
            let kind = match &v.kind {
                VariableKind::Categorical { .. } => "categorical",
                VariableKind::Numerical { .. } => "numerical",
            };
            format!(
                "**{}** ({}):\n{}\nMedical name: {}",
                v.name,
                kind,
                v.description,
                display_name(v, language)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Extract the following clinical variables from the conversation.

VARIABLES TO EXTRACT:
{}

CONVERSATION CONTEXT:
{}

RULES:
1. Extract ONLY explicitly mentioned values
2. For numerical variables: include unit of measurement
3. If not mentioned: set value=null and provide errorMessage
4. errorMessage format: "{} [variable name]"

Return in the structured format specified."#,
        described,
        context,
        missing_value_prefix(language)
    )
}

// ============================================================================
// Interpretation
// ============================================================================

/// One line per successful scale, plus its stored LLM guidance if any.
pub fn build_scales_summary(
    report: &PipelineReport,
    guidance: &BTreeMap<String, String>,
) -> String {
    let mut summary = Vec::new();
    for outcome in report.successful() {
        let Some(result) = &outcome.result else {
            continue;
        };
        let name = outcome.scale_name.as_deref().unwrap_or(&outcome.code_name);
        summary.push(format!("- {}: {} - {}", name, result.score, result.interpretation));
        if let Some(context) = guidance.get(&outcome.code_name) {
            summary.push(format!("  Context: {}", context));
        }
    }
    summary.join("\n")
}

/// Prompt for a joint interpretation of several calculated scales.
pub fn make_interpretation_prompt(
    scales_summary: &str,
    patient_context: &serde_json::Value,
    language: &str,
) -> String {
    let context = serde_json::to_string_pretty(patient_context)
        .unwrap_or_else(|_| patient_context.to_string());
    format!(
        r#"You are a clinical decision support system providing contextualized interpretation of clinical scales.

PATIENT CONTEXT:
{}

CALCULATED SCALES:
{}

Provide a comprehensive interpretation considering:
1. How these scales relate to each other
2. Patient-specific risk factors and context
3. Current medications and contraindications
4. Practical clinical recommendations
5. Follow-up and monitoring needs

Language: {}
Be concise, actionable, and evidence-based."#,
        context,
        scales_summary,
        language.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use medscale_core::models::{CalculationResult, LocalizedText};
    use medscale_core::pipeline::{ScaleOutcome, ScaleSource};

    #[test]
    fn test_extraction_prompt() {
        let prompt = make_scale_extraction_prompt("Wells score for DVT");
        assert!(prompt.contains("Wells score for DVT"));
        assert!(prompt.contains("calculationType"));
    }

    #[test]
    fn test_full_prompt_with_examples() {
        let prompt = build_full_prompt("HEART score", true);
        assert!(prompt.starts_with("<|system|>"));
        assert!(prompt.contains("clinical informatics assistant"));
        assert!(prompt.contains("Lim WS"));
        assert!(prompt.contains("HEART score"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_full_prompt_without_examples() {
        let prompt = build_full_prompt("HEART score", false);
        assert!(!prompt.contains("Lim WS"));
        assert_eq!(prompt.matches("<|user|>").count(), 1);
    }

    #[test]
    fn test_few_shot_examples_are_valid_drafts() {
        for (_, output) in FEW_SHOT_EXAMPLES {
            let draft: medscale_core::models::ScaleDraft = serde_json::from_str(output).unwrap();
            assert_eq!(draft.variables.len(), 5);
        }
    }

    #[test]
    fn test_missing_value_messages() {
        let mut weight = Variable::numerical("weight", "Body weight", Some("kg"));
        weight.medical_name = LocalizedText::english("Weight").with("pt", "Peso");

        assert_eq!(missing_value_message("pt", &weight), "Doutor, você não mencionou Peso");
        assert_eq!(missing_value_message("en", &weight), "Doctor, you did not mention Weight");
        assert_eq!(missing_value_message("es", &weight), "Doctor, no mencionó Weight");
    }

    #[test]
    fn test_value_prompt_lists_variables() {
        let variables = vec![Variable::numerical("weight", "Body weight", Some("kg"))];
        let prompt = make_value_extraction_prompt(&variables, "Patient weighs 80 kg", "es");
        assert!(prompt.contains("**weight** (numerical)"));
        assert!(prompt.contains("Patient weighs 80 kg"));
        assert!(prompt.contains("Doctor, no mencionó [variable name]"));
    }

    #[test]
    fn test_scales_summary() {
        let report = PipelineReport {
            outcomes: vec![
                ScaleOutcome {
                    code_name: "curb_65".into(),
                    scale_name: Some("CURB-65 Score".into()),
                    source: ScaleSource::Reference,
                    result: Some(CalculationResult {
                        score: 3.0,
                        category: None,
                        interpretation: "30-day mortality: 14%".into(),
                        recommendation: "Hospital admission".into(),
                        breakdown: Vec::new(),
                        details: Default::default(),
                    }),
                    error: None,
                },
                ScaleOutcome {
                    code_name: "apache_ii".into(),
                    scale_name: None,
                    source: ScaleSource::Unknown,
                    result: None,
                    error: None,
                },
            ],
            ..Default::default()
        };
        let guidance =
            BTreeMap::from([("curb_65".to_string(), "Consider local resistance".to_string())]);

        let summary = build_scales_summary(&report, &guidance);
        assert_eq!(
            summary,
            "- CURB-65 Score: 3 - 30-day mortality: 14%\n  Context: Consider local resistance"
        );

        let prompt = make_interpretation_prompt(&summary, &serde_json::json!({"age": 70}), "pt");
        assert!(prompt.contains("Language: PT"));
        assert!(prompt.contains("\"age\": 70"));
    }
}
