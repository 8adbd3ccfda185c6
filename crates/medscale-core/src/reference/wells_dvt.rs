//! Wells criteria for deep vein thrombosis.

use std::collections::BTreeMap;

use super::{points_total, text, yes_no, ReferenceOutcome, ReferenceScale, TestVector};
use crate::engine::{EvaluationResult, ResolvedInputs};
use crate::models::{
    InputValue, InterpretationEntry, InterpretationTable, LocalizedText, ScoringRule, Variable,
};

const VARIABLES: [&str; 10] = [
    "cancer",
    "paralysis",
    "bedridden",
    "tenderness",
    "swelling",
    "calf",
    "edema",
    "veins",
    "previous",
    "alternative",
];

pub struct WellsDvt;

/// (probability label, management) for a score.
fn band(score: f64) -> (&'static str, &'static str) {
    if score <= 0.0 {
        ("Low (5%)", "D-dimer; if negative, DVT excluded")
    } else if score <= 2.0 {
        ("Moderate (17%)", "D-dimer or ultrasound")
    } else {
        ("High (53%)", "Ultrasound recommended")
    }
}

impl ReferenceScale for WellsDvt {
    fn code_name(&self) -> &'static str {
        "wells_dvt"
    }

    fn name(&self) -> LocalizedText {
        LocalizedText::english("Wells Score for DVT")
            .with("pt", "Escore de Wells para TVP")
            .with("es", "Escala de Wells para TVP")
    }

    fn description(&self) -> &'static str {
        "Pretest probability of deep vein thrombosis."
    }

    fn reference(&self) -> &'static str {
        "Wells PS, et al. NEJM. 2003"
    }

    fn category(&self) -> Vec<String> {
        vec!["vascular".into(), "emergency".into()]
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            yes_no("cancer", "Active cancer (treatment within 6 months or palliative)", 1.0),
            yes_no("paralysis", "Paralysis, paresis or recent leg immobilization", 1.0),
            yes_no("bedridden", "Bedridden >3 days or major surgery within 12 weeks", 1.0),
            yes_no("tenderness", "Localized tenderness along the deep venous system", 1.0),
            yes_no("swelling", "Entire leg swollen", 1.0),
            yes_no("calf", "Calf swelling >3 cm compared to the other leg", 1.0),
            yes_no("edema", "Pitting edema confined to the symptomatic leg", 1.0),
            yes_no("veins", "Collateral superficial veins (non-varicose)", 1.0),
            yes_no("previous", "Previously documented DVT", 1.0),
            yes_no("alternative", "Alternative diagnosis at least as likely as DVT", -2.0),
        ]
    }

    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome> {
        let score = points_total(&self.variables(), inputs)?;
        let (probability, management) = band(score);

        Ok(ReferenceOutcome {
            score,
            category: Some(probability.to_string()),
            interpretation: format!("DVT probability: {}", probability),
            recommendation: management.to_string(),
            details: BTreeMap::new(),
        })
    }

    fn generic_rule(&self) -> Option<ScoringRule> {
        Some(ScoringRule::SumOfPoints)
    }

    fn interpretation(&self) -> InterpretationTable {
        let entry = |range: &str, score: f64| {
            let (probability, management) = band(score);
            let meaning = format!("DVT probability: {}", probability);
            InterpretationEntry::new(range, &meaning, management)
        };
        InterpretationTable::english(vec![entry("<=0", 0.0), entry("1-2", 1.0), entry(">=3", 3.0)])
    }

    fn test_vectors(&self) -> Vec<TestVector> {
        let case = |yes: &[&str]| -> Vec<(&'static str, InputValue)> {
            VARIABLES
                .into_iter()
                .map(|n| (n, text(if yes.contains(&n) { "Yes" } else { "No" })))
                .collect()
        };

        vec![
            TestVector {
                name: "Alternative diagnosis only",
                inputs: case(&["alternative"]),
                expected: -2.0,
                tolerance: 0.0,
                expected_category: Some("Low (5%)"),
            },
            TestVector {
                name: "Tenderness with likely alternative",
                inputs: case(&["tenderness", "alternative"]),
                expected: -1.0,
                tolerance: 0.0,
                expected_category: Some("Low (5%)"),
            },
            TestVector {
                name: "Bedridden with tenderness",
                inputs: case(&["bedridden", "tenderness"]),
                expected: 2.0,
                tolerance: 0.0,
                expected_category: Some("Moderate (17%)"),
            },
            TestVector {
                name: "Multiple findings with cancer and previous DVT",
                inputs: case(&[
                    "cancer",
                    "bedridden",
                    "tenderness",
                    "swelling",
                    "calf",
                    "edema",
                    "previous",
                ]),
                expected: 7.0,
                tolerance: 0.0,
                expected_category: Some("High (53%)"),
            },
        ]
    }
}
