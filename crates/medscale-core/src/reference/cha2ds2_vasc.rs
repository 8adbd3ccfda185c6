//! CHA₂DS₂-VASc: stroke risk in atrial fibrillation.

use std::collections::BTreeMap;

use super::{points_total, text, yes_no, ReferenceOutcome, ReferenceScale, TestVector};
use crate::engine::{EvaluationResult, ResolvedInputs};
use crate::models::{
    CategoricalOption, InterpretationEntry, InterpretationTable, LocalizedText, ScoringRule,
    Variable,
};

/// Annual stroke risk by score.
const RISK_MAP: [&str; 10] = [
    "0%", "1.3%", "2.2%", "3.2%", "4.0%", "6.7%", "9.8%", "9.6%", "12.5%", "15.2%",
];

const MAX_SCORE: f64 = 9.0;

pub struct Cha2ds2Vasc;

fn coded(name: &str, description: &str, options: &[(&str, f64, &str)]) -> Variable {
    Variable::categorical(
        name,
        description,
        options
            .iter()
            .map(|(code, points, label)| CategoricalOption::new(*code, *points).with_label(*label))
            .collect(),
    )
}

fn recommendation(score: f64) -> &'static str {
    if score == 0.0 {
        "No anticoagulation recommended (male) or consider (female with score 1)"
    } else if score == 1.0 {
        "Consider oral anticoagulation"
    } else {
        "Oral anticoagulation recommended"
    }
}

impl ReferenceScale for Cha2ds2Vasc {
    fn code_name(&self) -> &'static str {
        "cha2ds2_vasc"
    }

    fn name(&self) -> LocalizedText {
        LocalizedText::english("CHA₂DS₂-VASc Score")
            .with("pt", "Escore CHA₂DS₂-VASc")
            .with("es", "Puntuación CHA₂DS₂-VASc")
    }

    fn description(&self) -> &'static str {
        "Stroke risk stratification in patients with atrial fibrillation."
    }

    fn reference(&self) -> &'static str {
        "Lip GY, et al. Chest. 2010"
    }

    fn category(&self) -> Vec<String> {
        vec!["cardiology".into()]
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            yes_no("chf", "Congestive heart failure", 1.0),
            yes_no("hypertension", "Hypertension history", 1.0),
            coded(
                "age_band",
                "Age category",
                &[("0", 0.0, "<65 years"), ("1", 1.0, "65-74 years"), ("2", 2.0, "≥75 years")],
            ),
            yes_no("diabetes", "Diabetes mellitus", 1.0),
            coded(
                "stroke",
                "Prior stroke, TIA or thromboembolism",
                &[("0", 0.0, "No"), ("2", 2.0, "Yes")],
            ),
            yes_no("vascular", "Vascular disease (MI, PAD or aortic plaque)", 1.0),
            coded("sex_category", "Sex category", &[("0", 0.0, "Male"), ("1", 1.0, "Female")]),
        ]
    }

    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome> {
        let score = points_total(&self.variables(), inputs)?.min(MAX_SCORE);
        let risk = RISK_MAP.get(score as usize).copied().unwrap_or(">15%");

        Ok(ReferenceOutcome {
            score,
            category: Some(format!("Score: {}", score)),
            interpretation: format!("Annual stroke risk: {}", risk),
            recommendation: recommendation(score).to_string(),
            details: BTreeMap::new(),
        })
    }

    fn generic_rule(&self) -> Option<ScoringRule> {
        Some(ScoringRule::SumOfPoints)
    }

    fn interpretation(&self) -> InterpretationTable {
        let entries = RISK_MAP
            .iter()
            .enumerate()
            .map(|(score, risk)| {
                InterpretationEntry::new(
                    &score.to_string(),
                    &format!("Annual stroke risk: {}", risk),
                    recommendation(score as f64),
                )
            })
            .collect();
        InterpretationTable::english(entries)
    }

    fn test_vectors(&self) -> Vec<TestVector> {
        let case = |values: [&'static str; 7]| -> Vec<(&'static str, crate::models::InputValue)> {
            ["chf", "hypertension", "age_band", "diabetes", "stroke", "vascular", "sex_category"]
                .into_iter()
                .zip(values)
                .map(|(name, value)| (name, text(value)))
                .collect()
        };

        vec![
            TestVector {
                name: "Low risk male under 65",
                inputs: case(["0", "0", "0", "0", "0", "0", "0"]),
                expected: 0.0,
                tolerance: 0.0,
                expected_category: Some("Score: 0"),
            },
            TestVector {
                name: "Male over 75 with CHF, hypertension, diabetes and vascular disease",
                inputs: case(["1", "1", "2", "1", "0", "1", "0"]),
                expected: 6.0,
                tolerance: 0.0,
                expected_category: Some("Score: 6"),
            },
            TestVector {
                name: "Female over 75 with every risk factor",
                inputs: case(["1", "1", "2", "1", "2", "1", "1"]),
                expected: 9.0,
                tolerance: 0.0,
                expected_category: Some("Score: 9"),
            },
            TestVector {
                name: "Male 65-74 with hypertension and diabetes",
                inputs: case(["0", "1", "1", "1", "0", "0", "0"]),
                expected: 3.0,
                tolerance: 0.0,
                expected_category: Some("Score: 3"),
            },
        ]
    }
}
