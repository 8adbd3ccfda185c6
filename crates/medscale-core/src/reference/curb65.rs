//! CURB-65: community-acquired pneumonia severity.

use std::collections::BTreeMap;

use super::{points_total, text, yes_no, ReferenceOutcome, ReferenceScale, TestVector};
use crate::engine::{EvaluationResult, ResolvedInputs};
use crate::models::{
    InputValue, InterpretationEntry, InterpretationTable, LocalizedText, ScoringRule, Variable,
};

/// 30-day mortality by score.
const MORTALITY: [&str; 6] = ["0.6%", "2.7%", "6.8%", "14%", "27.8%", "27.8%"];

const VARIABLES: [&str; 5] = ["confusion", "bun", "rr", "bp", "age_65_or_older"];

pub struct Curb65;

fn disposition(score: f64) -> &'static str {
    if score <= 1.0 {
        "Outpatient treatment"
    } else if score == 2.0 {
        "Consider hospital admission"
    } else if score == 3.0 {
        "Hospital admission"
    } else {
        "ICU admission"
    }
}

impl ReferenceScale for Curb65 {
    fn code_name(&self) -> &'static str {
        "curb_65"
    }

    fn name(&self) -> LocalizedText {
        LocalizedText::english("CURB-65 Score")
            .with("pt", "Escore CURB-65")
            .with("es", "Escala CURB-65")
    }

    fn description(&self) -> &'static str {
        "Pneumonia severity assessment and 30-day mortality prediction."
    }

    fn reference(&self) -> &'static str {
        "Lim WS, et al. Thorax. 2003"
    }

    fn category(&self) -> Vec<String> {
        vec!["pulmonology".into()]
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            yes_no("confusion", "New onset confusion", 1.0),
            yes_no("bun", "Blood urea nitrogen >19 mg/dL (>7 mmol/L)", 1.0),
            yes_no("rr", "Respiratory rate ≥30/min", 1.0),
            yes_no("bp", "Systolic BP <90 mmHg or diastolic BP ≤60 mmHg", 1.0),
            yes_no("age_65_or_older", "Age ≥65 years", 1.0),
        ]
    }

    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome> {
        let score = points_total(&self.variables(), inputs)?.min(5.0);
        let mortality = MORTALITY.get(score as usize).copied().unwrap_or(">27%");

        Ok(ReferenceOutcome {
            score,
            category: Some(format!("CURB-65: {}", score)),
            interpretation: format!("30-day mortality: {}", mortality),
            recommendation: disposition(score).to_string(),
            details: BTreeMap::new(),
        })
    }

    fn generic_rule(&self) -> Option<ScoringRule> {
        Some(ScoringRule::SumOfPoints)
    }

    fn interpretation(&self) -> InterpretationTable {
        InterpretationTable::english(vec![
            InterpretationEntry::new("0-1", "30-day mortality: 0.6-2.7%", disposition(0.0)),
            InterpretationEntry::new("2", "30-day mortality: 6.8%", disposition(2.0)),
            InterpretationEntry::new("3", "30-day mortality: 14%", disposition(3.0)),
            InterpretationEntry::new("4-5", "30-day mortality: 27.8%", disposition(4.0)),
        ])
    }

    fn test_vectors(&self) -> Vec<TestVector> {
        let case = |values: [&'static str; 5]| -> Vec<(&'static str, InputValue)> {
            VARIABLES.into_iter().zip(values).map(|(n, v)| (n, text(v))).collect()
        };

        vec![
            TestVector {
                name: "Young patient, normal vitals",
                inputs: case(["No", "No", "No", "No", "No"]),
                expected: 0.0,
                tolerance: 0.0,
                expected_category: Some("CURB-65: 0"),
            },
            TestVector {
                name: "Elevated BUN and respiratory rate",
                inputs: case(["No", "Yes", "Yes", "No", "No"]),
                expected: 2.0,
                tolerance: 0.0,
                expected_category: Some("CURB-65: 2"),
            },
            TestVector {
                name: "Elderly with confusion and hypotension",
                inputs: case(["Yes", "Yes", "No", "Yes", "Yes"]),
                expected: 4.0,
                tolerance: 0.0,
                expected_category: Some("CURB-65: 4"),
            },
            TestVector {
                name: "All five criteria present",
                inputs: case(["Yes", "Yes", "Yes", "Yes", "Yes"]),
                expected: 5.0,
                tolerance: 0.0,
                expected_category: Some("CURB-65: 5"),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_bands() {
        assert_eq!(disposition(0.0), "Outpatient treatment");
        assert_eq!(disposition(1.0), "Outpatient treatment");
        assert_eq!(disposition(2.0), "Consider hospital admission");
        assert_eq!(disposition(3.0), "Hospital admission");
        assert_eq!(disposition(5.0), "ICU admission");
    }
}
