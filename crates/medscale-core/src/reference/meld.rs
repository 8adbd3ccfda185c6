//! MELD and MELD-Na: end-stage liver disease severity.
//!
//! The reported score is MELD-Na; plain MELD is kept in the details.

use std::collections::BTreeMap;

use super::{number, serum_creatinine, text, yes_no, ReferenceOutcome, ReferenceScale, TestVector};
use crate::engine::{EvaluationResult, ResolvedInputs};
use crate::models::{
    InputValue, InterpretationEntry, InterpretationTable, LocalizedText, ScoringRule, Variable,
};

const SCORE_MIN: f64 = 6.0;
const SCORE_MAX: f64 = 40.0;

/// Creatinine used for patients on dialysis.
const DIALYSIS_CREATININE: f64 = 4.0;

/// Same algorithm as [`meld_scores`], expressed in the generic grammar.
/// `dialysis` contributes 0/1 points, which forces creatinine to the cap.
const MELD_NA_FORMULA: &str = "max(6, min(40, round(\
max(6, min(40, round(10 * (0.957 * ln(max(1, min(4, creatinine + dialysis * 4))) + 0.378 * ln(max(1, bilirubin)) + 1.120 * ln(max(1, inr)) + 0.643)))) \
+ 1.32 * (137 - max(125, min(137, sodium))) \
- 0.033 * max(6, min(40, round(10 * (0.957 * ln(max(1, min(4, creatinine + dialysis * 4))) + 0.378 * ln(max(1, bilirubin)) + 1.120 * ln(max(1, inr)) + 0.643)))) \
* (137 - max(125, min(137, sodium))))))";

pub struct Meld;

/// (MELD, MELD-Na), both clamped to [6, 40]. Rounding is half-to-even.
pub fn meld_scores(
    creatinine: f64,
    bilirubin: f64,
    inr: f64,
    sodium: f64,
    dialysis: bool,
) -> (f64, f64) {
    let cr = if dialysis { DIALYSIS_CREATININE } else { creatinine }.clamp(1.0, 4.0);
    let bili = bilirubin.max(1.0);
    let inr = inr.max(1.0);
    let na = sodium.clamp(125.0, 137.0);

    let raw = 10.0 * (0.957 * cr.ln() + 0.378 * bili.ln() + 1.120 * inr.ln() + 0.643);
    let meld = raw.round_ties_even().clamp(SCORE_MIN, SCORE_MAX);

    let meld_na = (meld + 1.32 * (137.0 - na) - 0.033 * meld * (137.0 - na))
        .round_ties_even()
        .clamp(SCORE_MIN, SCORE_MAX);

    (meld, meld_na)
}

fn mortality(meld: f64) -> &'static str {
    if meld <= 9.0 {
        "1.9% (3-month)"
    } else if meld <= 19.0 {
        "6% (3-month)"
    } else if meld <= 29.0 {
        "19.6% (3-month)"
    } else if meld <= 39.0 {
        "52.6% (3-month)"
    } else {
        "71.3% (3-month)"
    }
}

fn management(meld: f64) -> &'static str {
    if meld >= 15.0 {
        "Consider transplant referral"
    } else {
        "Monitor closely"
    }
}

impl ReferenceScale for Meld {
    fn code_name(&self) -> &'static str {
        "meld"
    }

    fn name(&self) -> LocalizedText {
        LocalizedText::english("MELD Score (Model for End-Stage Liver Disease)")
            .with("pt", "Escore MELD")
            .with("es", "Puntuación MELD")
    }

    fn description(&self) -> &'static str {
        "Predicts 3-month mortality in end-stage liver disease; used for transplant allocation."
    }

    fn reference(&self) -> &'static str {
        "Kamath PS, et al. Hepatology. 2001"
    }

    fn category(&self) -> Vec<String> {
        vec!["hepatology".into()]
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            serum_creatinine(),
            Variable::numerical("bilirubin", "Total bilirubin", Some("mg/dL"))
                .with_units(&["mg/dL", "umol/L"])
                .with_bounds(Some(0.1), Some(50.0)),
            Variable::numerical("inr", "International normalized ratio", None)
                .with_bounds(Some(0.5), Some(10.0)),
            Variable::numerical("sodium", "Serum sodium", Some("mEq/L"))
                .with_units(&["mEq/L", "mmol/L"])
                .with_bounds(Some(100.0), Some(160.0)),
            yes_no("dialysis", "Dialysis at least twice in the past week", 1.0),
        ]
    }

    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome> {
        let (meld, meld_na) = meld_scores(
            inputs.number("creatinine")?,
            inputs.number("bilirubin")?,
            inputs.number("inr")?,
            inputs.number("sodium")?,
            inputs.flag("dialysis")?,
        );

        let mut details = BTreeMap::new();
        details.insert("meld".to_string(), meld);
        details.insert("meld_na".to_string(), meld_na);

        Ok(ReferenceOutcome {
            score: meld_na,
            category: Some(format!("MELD: {} | MELD-Na: {}", meld, meld_na)),
            interpretation: format!("Mortality: {}", mortality(meld)),
            recommendation: management(meld).to_string(),
            details,
        })
    }

    fn generic_rule(&self) -> Option<ScoringRule> {
        Some(ScoringRule::formula(MELD_NA_FORMULA))
    }

    fn interpretation(&self) -> InterpretationTable {
        let entry = |range: &str, meld: f64| {
            let meaning = format!("Mortality: {}", mortality(meld));
            InterpretationEntry::new(range, &meaning, management(meld))
        };
        InterpretationTable::english(vec![
            entry("6-9", 6.0),
            entry("10-14", 10.0),
            entry("15-19", 15.0),
            entry("20-29", 20.0),
            entry("30-39", 30.0),
            entry(">=40", 40.0),
        ])
    }

    fn test_vectors(&self) -> Vec<TestVector> {
        type Case = Vec<(&'static str, InputValue)>;
        let case = |cr: f64, bili: f64, inr: f64, na: f64, dialysis: &'static str| -> Case {
            vec![
                ("creatinine", number(cr)),
                ("bilirubin", number(bili)),
                ("inr", number(inr)),
                ("sodium", number(na)),
                ("dialysis", text(dialysis)),
            ]
        };

        vec![
            TestVector {
                name: "Mild liver disease",
                inputs: case(0.9, 1.2, 1.1, 140.0, "No"),
                expected: 8.0,
                tolerance: 0.0,
                expected_category: Some("MELD: 8 | MELD-Na: 8"),
            },
            TestVector {
                name: "Moderate liver disease",
                inputs: case(1.5, 3.0, 1.8, 135.0, "No"),
                expected: 22.0,
                tolerance: 0.0,
                expected_category: Some("MELD: 21 | MELD-Na: 22"),
            },
            TestVector {
                name: "Severe disease with hyponatremia",
                inputs: case(2.5, 8.0, 2.5, 128.0, "No"),
                expected: 35.0,
                tolerance: 0.0,
                expected_category: Some("MELD: 33 | MELD-Na: 35"),
            },
            TestVector {
                name: "On dialysis",
                inputs: case(5.0, 5.0, 2.0, 132.0, "Yes"),
                expected: 35.0,
                tolerance: 0.0,
                expected_category: Some("MELD: 34 | MELD-Na: 35"),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Formula;

    #[test]
    fn test_golden_meld() {
        assert_eq!(meld_scores(2.5, 8.0, 2.5, 128.0, false), (33.0, 35.0));
        assert_eq!(meld_scores(5.0, 5.0, 2.0, 132.0, true), (34.0, 35.0));
        assert_eq!(meld_scores(0.9, 1.2, 1.1, 140.0, false), (8.0, 8.0));
    }

    #[test]
    fn test_dialysis_overrides_low_creatinine() {
        assert_eq!(
            meld_scores(0.5, 1.0, 1.0, 137.0, true),
            meld_scores(4.0, 1.0, 1.0, 137.0, false)
        );
    }

    #[test]
    fn test_floor_at_six() {
        let (meld, meld_na) = meld_scores(0.5, 0.5, 0.8, 140.0, false);
        assert_eq!(meld, 6.0);
        assert_eq!(meld_na, 6.0);
    }

    #[test]
    fn test_bands() {
        assert_eq!(mortality(33.0), "52.6% (3-month)");
        assert_eq!(mortality(8.0), "1.9% (3-month)");
        assert_eq!(management(15.0), "Consider transplant referral");
        assert_eq!(management(14.0), "Monitor closely");
    }

    #[test]
    fn test_formula_parses() {
        let formula = Formula::parse(MELD_NA_FORMULA).unwrap();
        let ids: Vec<String> = formula.identifiers().into_iter().collect();
        assert_eq!(ids, vec!["bilirubin", "creatinine", "dialysis", "inr", "sodium"]);
    }
}
