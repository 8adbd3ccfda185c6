//! Scale draft extraction from LLM output and legacy write-ups.
//!
//! Pipeline: Prompt → Completion → JSON Slice → ScaleDraft

use std::fmt;

use medscale_core::models::{
    normalize_code_name, CalculationType, DraftOption, DraftVariable, DraftVariableType,
    InterpretationEntry, ScaleDraft,
};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::prompts::build_full_prompt;

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Completion backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// The outermost `{ ... }` of a completion that may carry extra prose.
pub fn find_json_object(text: &str) -> ExtractionResult<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| ExtractionError::InvalidFormat("No JSON object found in response".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| {
            ExtractionError::InvalidFormat("No closing brace found in response".into())
        })?;
    if end < start {
        return Err(ExtractionError::InvalidFormat("Closing brace precedes opening brace".into()));
    }
    Ok(&text[start..=end])
}

/// Parse a completion into a scale draft.
pub fn parse_scale_draft(text: &str) -> ExtractionResult<ScaleDraft> {
    let draft: ScaleDraft = serde_json::from_str(find_json_object(text)?)?;
    Ok(draft)
}

/// Text completion: prompt in, completion out.
pub trait CompletionBackend {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Anything that turns a scale write-up into a draft.
pub trait ScaleExtractor {
    fn extract(&self, text: &str) -> ExtractionResult<ScaleDraft>;
}

/// Prompt → backend → parser.
pub struct PromptedExtractor<B> {
    backend: B,
    include_examples: bool,
}

impl<B: CompletionBackend> PromptedExtractor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            include_examples: true,
        }
    }

    /// Drop the few-shot examples (shorter prompts for small context windows).
    pub fn without_examples(mut self) -> Self {
        self.include_examples = false;
        self
    }
}

impl<B: CompletionBackend> ScaleExtractor for PromptedExtractor<B> {
    fn extract(&self, text: &str) -> ExtractionResult<ScaleDraft> {
        let prompt = build_full_prompt(text, self.include_examples);
        let completion = self.backend.complete(&prompt)?;
        tracing::debug!(chars = completion.len(), "Received scale extraction completion");
        parse_scale_draft(&completion)
    }
}

// ============================================================================
// Legacy write-ups
// ============================================================================

/// Deterministic extractor for plain-text scale write-ups.
///
/// Recognized lines:
/// - first line: scale name; second line: description
/// - `Reference: ...`
/// - `# Label: {"No": 0, "Yes": 2}`: select variable with option points
/// - `# Label (number) [unit]`: numeric variable
/// - `Formula: expression`: switches to a formula calculation
/// - `SCORE 0-1 - LOW RISK:` opens an interpretation entry; following
///   `- bullet` lines after `Recommendation:` become its recommendation
pub struct MockExtractor;

impl ScaleExtractor for MockExtractor {
    fn extract(&self, text: &str) -> ExtractionResult<ScaleDraft> {
        MockExtractor::parse(text)
    }
}

impl MockExtractor {
    pub fn parse(text: &str) -> ExtractionResult<ScaleDraft> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim().trim_matches('"').trim())
            .filter(|l| !l.is_empty())
            .collect();

        let mut header = lines.iter().filter(|l| !is_structured(l));
        let scale_name = header
            .next()
            .map(|l| l.to_string())
            .ok_or_else(|| ExtractionError::InvalidFormat("Empty scale description".into()))?;
        let description = header.next().map(|l| l.to_string()).unwrap_or_default();

        let mut draft = ScaleDraft {
            scale_name,
            description,
            reference: None,
            calculation_type: CalculationType::Sum,
            variables: Vec::new(),
            formula: None,
            interpretation: Vec::new(),
            recommendation: None,
        };

        let mut in_recommendation = false;
        for line in &lines {
            if let Some(reference) = strip_label(line, "reference:") {
                draft.reference = Some(reference.to_string());
            } else if let Some(formula) = strip_label(line, "formula:") {
                draft.calculation_type = CalculationType::Formula;
                draft.formula = Some(formula.to_string());
            } else if let Some(rest) = line.strip_prefix('#') {
                if let Some(variable) = parse_variable_line(rest.trim())? {
                    draft.variables.push(variable);
                }
            } else if let Some(entry) = parse_score_line(line) {
                draft.interpretation.push(entry);
                in_recommendation = false;
            } else if line.eq_ignore_ascii_case("recommendation:") {
                in_recommendation = true;
            } else if let Some(bullet) = line.strip_prefix("- ") {
                if let (true, Some(entry)) = (in_recommendation, draft.interpretation.last_mut()) {
                    if !entry.recommendation.is_empty() {
                        entry.recommendation.push_str("; ");
                    }
                    entry.recommendation.push_str(bullet.trim());
                }
            }
        }

        if draft.variables.is_empty() {
            return Err(ExtractionError::InvalidFormat("No variables found".into()));
        }
        tracing::debug!(
            scale = %draft.scale_name,
            variables = draft.variables.len(),
            entries = draft.interpretation.len(),
            "Parsed legacy scale write-up"
        );
        Ok(draft)
    }
}

fn is_structured(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with("- ")
        || line.to_lowercase().starts_with("score ")
        || line.ends_with(':')
        || strip_label(line, "reference:").is_some()
        || strip_label(line, "formula:").is_some()
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| line[label.len()..].trim())
}

/// Option codes with points, in written order.
struct OrderedPoints(Vec<(String, f64)>);

impl<'de> Deserialize<'de> for OrderedPoints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PointsVisitor;

        impl<'de> Visitor<'de> for PointsVisitor {
            type Value = OrderedPoints;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of option codes to points")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((code, points)) = map.next_entry::<String, f64>()? {
                    entries.push((code, points));
                }
                Ok(OrderedPoints(entries))
            }
        }

        deserializer.deserialize_map(PointsVisitor)
    }
}

/// `Label: {...}` or `Label (number) [unit]`. Other comment lines are skipped.
fn parse_variable_line(line: &str) -> ExtractionResult<Option<DraftVariable>> {
    if let Some(brace) = line.find('{') {
        let label = line[..brace].trim().trim_end_matches(':').trim();
        let points: OrderedPoints = serde_json::from_str(find_json_object(&line[brace..])?)?;
        let options = points
            .0
            .into_iter()
            .map(|(value, points)| DraftOption {
                value,
                label: None,
                points: Some(points),
            })
            .collect();
        return Ok(Some(DraftVariable {
            name: variable_name(label),
            kind: DraftVariableType::Select,
            description: label.to_string(),
            options,
            min: None,
            max: None,
            unit: None,
        }));
    }

    if let Some(marker) = line.find("(number)") {
        let label = line[..marker].trim().trim_end_matches(':').trim();
        let unit = line[marker..]
            .find('[')
            .zip(line[marker..].find(']'))
            .map(|(open, close)| line[marker + open + 1..marker + close].trim().to_string())
            .filter(|u| !u.is_empty());
        return Ok(Some(DraftVariable {
            name: variable_name(label),
            kind: DraftVariableType::Number,
            description: label.to_string(),
            options: Vec::new(),
            min: None,
            max: None,
            unit,
        }));
    }

    Ok(None)
}

/// Code name from the label text before any parenthesized detail.
fn variable_name(label: &str) -> String {
    let head = label.split('(').next().unwrap_or(label);
    normalize_code_name(head)
}

/// `SCORE 0-1 - LOW RISK (<5%):` → entry with range "0-1".
fn parse_score_line(line: &str) -> Option<InterpretationEntry> {
    let rest = strip_label(line, "score ")?;
    let (range, meaning) = rest.split_once(" - ")?;
    let meaning = meaning.trim().trim_end_matches(':').trim();
    Some(InterpretationEntry::new(range.trim(), meaning, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTS6: &str = r#"
Carpal Tunnel Syndrome-6 (CTS-6)
Estimates the likelihood of carpal tunnel syndrome in adults
Reference: Graham B, et al. J Bone Joint Surg Am. 2006

# Numbness predominately or exclusively in median nerve territory: {"0": 0, "1": 3.5}
# Nocturnal numbness: {"0": 0, "1": 4}
# Thenar atrophy and/or weakness: {"0": 0, "1": 5}
# Positive Phalen test: {"0": 0, "1": 5}
# Loss of 2 point discrimination: {"0": 0, "1": 4.5}
# Positive Tinel sign: {"0": 0, "1": 4}
"#;

    const CARDIOTOXICITY: &str = r#"
Cardiotoxicity Risk Score for Cancer Patients
Predicts susceptibility to cardiotoxicity in cancer patients receiving chemotherapy

# Previous Radiotherapy (mediastinal or chest radiation): {"No": 0, "Yes": 2}
# Baseline LVEF (Left Ventricular Ejection Fraction): {">64%": 0, "54-63%": 2, "≤53%": 3}
# Age (number) [years]

SCORE 0-1 - LOW RISK (<5%):
Cardiotoxicity Incidence: 3.3%

Recommendation:
- Standard cardiac monitoring
- Baseline echocardiography at treatment start

SCORE 2 - MODERATE RISK (13-22%):
Recommendation:
- Enhanced cardiac monitoring
"#;

    struct CannedBackend(&'static str);

    impl CompletionBackend for CannedBackend {
        fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            anyhow::ensure!(prompt.contains("<|assistant|>"), "prompt has no assistant turn");
            Ok(self.0.to_string())
        }
    }

    struct FailingBackend;

    impl CompletionBackend for FailingBackend {
        fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("model not loaded")
        }
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let completion = r#"Here is the scale:
{"scale_name": "Toy", "calculationType": "sum", "variables": []}
Let me know if you need anything else."#;

        let draft = parse_scale_draft(completion).unwrap();
        assert_eq!(draft.scale_name, "Toy");
        assert_eq!(draft.calculation_type, CalculationType::Sum);
    }

    proptest::proptest! {
        #[test]
        fn prop_prose_around_json_is_ignored(
            prefix in "[^{}]{0,40}",
            suffix in "[^{}]{0,40}",
        ) {
            let completion = format!(
                "{}{{\"scale_name\": \"Toy\", \"calculationType\": \"sum\"}}{}",
                prefix, suffix
            );
            let draft = parse_scale_draft(&completion).unwrap();
            proptest::prop_assert_eq!(draft.scale_name, "Toy");
        }
    }

    #[test]
    fn test_parse_without_json() {
        assert!(matches!(
            parse_scale_draft("I cannot help with that."),
            Err(ExtractionError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_scale_draft("{\"scale_name\": }"),
            Err(ExtractionError::JsonParse(_))
        ));
    }

    #[test]
    fn test_prompted_extractor() {
        let extractor = PromptedExtractor::new(CannedBackend(
            r#"{"scale_name": "Toy", "calculationType": "formula", "formula": "a * 2",
                "variables": [{"name": "a", "type": "number"}]}"#,
        ));
        let draft = extractor.extract("Toy scale: twice a").unwrap();
        assert_eq!(draft.formula.as_deref(), Some("a * 2"));

        let failing = PromptedExtractor::new(FailingBackend).without_examples();
        assert!(matches!(failing.extract("anything"), Err(ExtractionError::Backend(_))));
    }

    #[test]
    fn test_mock_weighted_options() {
        let draft = MockExtractor.extract(CTS6).unwrap();
        assert_eq!(draft.scale_name, "Carpal Tunnel Syndrome-6 (CTS-6)");
        assert_eq!(
            draft.description,
            "Estimates the likelihood of carpal tunnel syndrome in adults"
        );
        assert_eq!(draft.reference.as_deref(), Some("Graham B, et al. J Bone Joint Surg Am. 2006"));
        assert_eq!(draft.variables.len(), 6);
        assert_eq!(
            draft.variables[0].name,
            "numbness_predominately_or_exclusively_in_median_nerve_territory"
        );
        assert_eq!(draft.variables[0].options[1].points, Some(3.5));
        assert_eq!(draft.calculation_type, CalculationType::Sum);
    }

    #[test]
    fn test_mock_interpretation_blocks() {
        let draft = MockExtractor::parse(CARDIOTOXICITY).unwrap();
        assert_eq!(draft.variables.len(), 3);

        let radiotherapy = &draft.variables[0];
        assert_eq!(radiotherapy.name, "previous_radiotherapy");
        assert_eq!(
            radiotherapy.description,
            "Previous Radiotherapy (mediastinal or chest radiation)"
        );

        let lvef = &draft.variables[1];
        let codes: Vec<&str> = lvef.options.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(codes, vec![">64%", "54-63%", "≤53%"]);

        let age = &draft.variables[2];
        assert_eq!(age.kind, DraftVariableType::Number);
        assert_eq!(age.unit.as_deref(), Some("years"));

        assert_eq!(draft.interpretation.len(), 2);
        assert_eq!(draft.interpretation[0].range, "0-1");
        assert_eq!(draft.interpretation[0].meaning, "LOW RISK (<5%)");
        assert_eq!(
            draft.interpretation[0].recommendation,
            "Standard cardiac monitoring; Baseline echocardiography at treatment start"
        );
        assert_eq!(draft.interpretation[1].recommendation, "Enhanced cardiac monitoring");
    }

    #[test]
    fn test_mock_draft_validates() {
        let draft = MockExtractor::parse(CTS6).unwrap();
        let units = medscale_core::units::UnitResolver::new();
        let (scale, variables) = draft.into_scale_and_variables(&units).unwrap();
        assert_eq!(scale.code_name, "carpal_tunnel_syndrome_6_cts_6");
        assert_eq!(variables.len(), 6);
    }

    #[test]
    fn test_mock_rejects_text_without_variables() {
        assert!(matches!(
            MockExtractor::parse("Just a title\nAnd a description"),
            Err(ExtractionError::InvalidFormat(_))
        ));
    }
}
