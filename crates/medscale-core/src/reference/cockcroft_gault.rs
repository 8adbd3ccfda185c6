//! Cockcroft-Gault creatinine clearance.

use std::collections::BTreeMap;

use super::{
    number, patient_age, patient_sex, serum_creatinine, text, ReferenceOutcome, ReferenceScale,
    TestVector, FEMALE_CLEARANCE_FACTOR,
};
use crate::engine::{EvaluationResult, ResolvedInputs};
use crate::models::{
    InputValue, InterpretationEntry, InterpretationTable, LocalizedText, ScoringRule, Variable,
};

pub struct CockcroftGault;

/// Creatinine clearance in mL/min. `sex_factor` is 1.0 for male, 0.85 for female.
pub fn creatinine_clearance(
    age: f64,
    weight_kg: f64,
    creatinine_mg_dl: f64,
    sex_factor: f64,
) -> f64 {
    (140.0 - age) * weight_kg * sex_factor / (72.0 * creatinine_mg_dl)
}

/// (stage, dosing note) for a clearance.
fn stage(clearance: f64) -> (&'static str, &'static str) {
    if clearance >= 90.0 {
        ("Normal or High", "No dose adjustment typically needed")
    } else if clearance >= 60.0 {
        ("Mildly decreased", "Check drug-specific recommendations")
    } else if clearance >= 30.0 {
        ("Moderately decreased", "Dose adjustment often required")
    } else if clearance >= 15.0 {
        ("Severely decreased", "Significant dose adjustment required")
    } else {
        ("Kidney failure", "Dialysis consideration; major dose adjustments")
    }
}

impl ReferenceScale for CockcroftGault {
    fn code_name(&self) -> &'static str {
        "cockcroft_gault"
    }

    fn name(&self) -> LocalizedText {
        LocalizedText::english("Cockcroft-Gault Creatinine Clearance")
            .with("pt", "Clearance de Creatinina (Cockcroft-Gault)")
            .with("es", "Aclaramiento de Creatinina (Cockcroft-Gault)")
    }

    fn description(&self) -> &'static str {
        "Estimates creatinine clearance for renal drug dosing."
    }

    fn reference(&self) -> &'static str {
        "Cockcroft DW, Gault MH. Nephron. 1976"
    }

    fn category(&self) -> Vec<String> {
        vec!["nephrology".into(), "pharmacology".into()]
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            patient_age(),
            Variable::numerical("weight", "Body weight", Some("kg"))
                .with_units(&["kg", "lb"])
                .with_bounds(Some(20.0), Some(300.0)),
            serum_creatinine(),
            patient_sex(),
        ]
    }

    fn calculate(&self, inputs: &ResolvedInputs) -> EvaluationResult<ReferenceOutcome> {
        let clearance = creatinine_clearance(
            inputs.number("age")?,
            inputs.number("weight")?,
            inputs.number("creatinine")?,
            inputs.number("sex")?,
        );
        let (stage, dosing) = stage(clearance);

        Ok(ReferenceOutcome {
            score: clearance,
            category: Some(format!("CrCl: {:.1} mL/min", clearance)),
            interpretation: format!("Kidney function: {}", stage),
            recommendation: dosing.to_string(),
            details: BTreeMap::new(),
        })
    }

    fn generic_rule(&self) -> Option<ScoringRule> {
        Some(ScoringRule::formula("(140 - age) * weight * sex / (72 * creatinine)"))
    }

    fn interpretation(&self) -> InterpretationTable {
        let entry = |range: &str, clearance: f64| {
            let (stage, dosing) = stage(clearance);
            InterpretationEntry::new(range, &format!("Kidney function: {}", stage), dosing)
        };
        InterpretationTable::english(vec![
            entry(">=90", 90.0),
            entry("60-90", 60.0),
            entry("30-60", 30.0),
            entry("15-30", 15.0),
            entry("<15", 0.0),
        ])
    }

    fn test_vectors(&self) -> Vec<TestVector> {
        type Case = Vec<(&'static str, InputValue)>;
        let case = |age: f64, sex: &'static str, weight: f64, creatinine: f64| -> Case {
            vec![
                ("age", number(age)),
                ("sex", text(sex)),
                ("weight", number(weight)),
                ("creatinine", number(creatinine)),
            ]
        };

        vec![
            TestVector {
                name: "Older male with elevated creatinine",
                inputs: case(65.0, "male", 80.0, 2.0),
                expected: 41.6667,
                tolerance: 0.001,
                expected_category: Some("CrCl: 41.7 mL/min"),
            },
            TestVector {
                name: "Young male, normal creatinine",
                inputs: case(30.0, "male", 70.0, 1.0),
                expected: 106.9444,
                tolerance: 0.001,
                expected_category: Some("CrCl: 106.9 mL/min"),
            },
            TestVector {
                name: "Elderly female",
                inputs: case(75.0, "female", 60.0, 1.2),
                expected: 38.3681,
                tolerance: 0.001,
                expected_category: Some("CrCl: 38.4 mL/min"),
            },
            TestVector {
                name: "Female with severe renal impairment",
                inputs: case(70.0, "female", 55.0, 4.5),
                expected: 10.1003,
                tolerance: 0.001,
                expected_category: Some("CrCl: 10.1 mL/min"),
            },
        ]
    }
}
