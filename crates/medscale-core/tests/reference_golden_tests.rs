//! Golden tests for the reference scale library.
//!
//! Every bundled vector runs through the coded calculation, and again
//! through the generic evaluator for scales that expose a generic rule.

use medscale_core::db::Database;
use medscale_core::engine::{EvaluationError, Evaluator};
use medscale_core::models::{InputValue, Inputs};
use medscale_core::pipeline::{ScalePipeline, ScaleSource};
use medscale_core::reference::all_reference_scales;

fn inputs(pairs: &[(&str, InputValue)]) -> Inputs {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[test]
fn test_coded_vectors() {
    let evaluator = Evaluator::new();

    for scale in all_reference_scales() {
        for vector in scale.test_vectors() {
            let result = evaluator
                .evaluate_reference_scale(scale.as_ref(), &vector.inputs(), "en")
                .unwrap_or_else(|e| panic!("{} / {}: {}", scale.code_name(), vector.name, e));

            assert!(
                (result.score - vector.expected).abs() <= vector.tolerance + 1e-9,
                "{} / {}: expected {}, got {}",
                scale.code_name(),
                vector.name,
                vector.expected,
                result.score
            );

            if let Some(category) = vector.expected_category {
                assert_eq!(
                    result.category.as_deref(),
                    Some(category),
                    "{} / {}: category mismatch",
                    scale.code_name(),
                    vector.name
                );
            }
        }
    }
}

#[test]
fn test_generic_path_matches_coded_path() {
    let evaluator = Evaluator::new();

    for scale in all_reference_scales() {
        let Some(generic) = scale.to_scale() else {
            continue;
        };
        let definitions = scale.variables();

        for vector in scale.test_vectors() {
            let result = evaluator
                .evaluate_scale(&generic, &definitions, &vector.inputs(), "en")
                .unwrap_or_else(|e| {
                    panic!("{} / {} (generic): {}", scale.code_name(), vector.name, e)
                });

            assert!(
                (result.score - vector.expected).abs() <= vector.tolerance + 1e-9,
                "{} / {} (generic): expected {}, got {}",
                scale.code_name(),
                vector.name,
                vector.expected,
                result.score
            );
        }
    }
}

#[test]
fn test_wells_alternative_only() {
    let evaluator = Evaluator::new();
    let names = [
        "cancer",
        "paralysis",
        "bedridden",
        "tenderness",
        "swelling",
        "calf",
        "edema",
        "veins",
        "previous",
    ];
    let mut pairs: Vec<(&str, InputValue)> =
        names.iter().map(|n| (*n, InputValue::new("No"))).collect();
    pairs.push(("alternative", InputValue::new("Yes")));

    let result = evaluator
        .evaluate_reference("wells_dvt", &inputs(&pairs), "en")
        .unwrap();
    assert_eq!(result.score, -2.0);
    assert_eq!(result.category.as_deref(), Some("Low (5%)"));
}

#[test]
fn test_cha2ds2_vasc_score_six() {
    let evaluator = Evaluator::new();
    let pairs = [
        ("chf", InputValue::new("1")),
        ("hypertension", InputValue::new("1")),
        ("age_band", InputValue::new("2")),
        ("diabetes", InputValue::new("1")),
        ("stroke", InputValue::new("0")),
        ("vascular", InputValue::new("1")),
        ("sex_category", InputValue::new("0")),
    ];

    let result = evaluator
        .evaluate_reference("CHA2DS2-VASc", &inputs(&pairs), "en")
        .unwrap();
    assert_eq!(result.score, 6.0);
    assert!(result.interpretation.contains("9.8%"));
}

#[test]
fn test_curb65_all_present() {
    let evaluator = Evaluator::new();
    let pairs: Vec<(&str, InputValue)> = ["confusion", "bun", "rr", "bp", "age_65_or_older"]
        .iter()
        .map(|n| (*n, InputValue::new("Yes")))
        .collect();

    let result = evaluator.evaluate_reference("curb_65", &inputs(&pairs), "en").unwrap();
    assert_eq!(result.score, 5.0);
    assert!(result.interpretation.contains("27.8%"));
    assert!(result.recommendation.contains("ICU"));
}

#[test]
fn test_cockcroft_gault_worked_example() {
    let evaluator = Evaluator::new();
    let pairs = [
        ("age", InputValue::new(65.0)),
        ("sex", InputValue::new("male")),
        ("weight", InputValue::with_unit(80.0, "kg")),
        ("creatinine", InputValue::with_unit(2.0, "mg/dL")),
    ];

    let result = evaluator
        .evaluate_reference("cockcroft_gault", &inputs(&pairs), "en")
        .unwrap();
    assert!((result.score - 41.67).abs() <= 0.01);
}

#[test]
fn test_cockcroft_gault_accepts_si_creatinine() {
    let evaluator = Evaluator::new();
    let pairs = [
        ("age", InputValue::new(65.0)),
        ("sex", InputValue::new("male")),
        ("weight", InputValue::with_unit(80.0, "kg")),
        ("creatinine", InputValue::with_unit(176.84, "umol/L")),
    ];

    let result = evaluator
        .evaluate_reference("cockcroft_gault", &inputs(&pairs), "en")
        .unwrap();
    assert!((result.score - 41.67).abs() <= 0.01);
}

#[test]
fn test_meld_published_example() {
    let evaluator = Evaluator::new();
    let pairs = [
        ("creatinine", InputValue::new(2.5)),
        ("bilirubin", InputValue::new(8.0)),
        ("inr", InputValue::new(2.5)),
        ("sodium", InputValue::new(128.0)),
        ("dialysis", InputValue::new("No")),
    ];

    let result = evaluator.evaluate_reference("meld", &inputs(&pairs), "en").unwrap();
    assert_eq!(result.details["meld"], 33.0);
    assert_eq!(result.details["meld_na"], 35.0);
    assert_eq!(result.score, 35.0);
}

#[test]
fn test_unknown_reference_scale() {
    let evaluator = Evaluator::new();
    let err = evaluator
        .evaluate_reference("apache_ii", &Inputs::new(), "en")
        .unwrap_err();
    assert_eq!(
        err,
        EvaluationError::UnknownScale {
            code_name: "apache_ii".into()
        }
    );
}

#[test]
fn test_installed_scales_keep_their_vectors() {
    let db = Database::open_in_memory().unwrap();
    let evaluator = Evaluator::new();
    let installed: Vec<_> = all_reference_scales()
        .into_iter()
        .filter_map(|reference| reference.to_scale().map(|scale| (reference, scale)))
        .collect();
    assert_eq!(installed.len(), 5);

    for (reference, scale) in &installed {
        db.store_scale(scale, &reference.variables()).unwrap();
    }

    let pipeline = ScalePipeline::new(&db, &evaluator);
    for (reference, scale) in &installed {
        for vector in reference.test_vectors() {
            let report = pipeline
                .calculate(&[scale.code_name.clone()], &vector.inputs(), "en")
                .unwrap();
            let outcome = &report.outcomes[0];
            assert_eq!(outcome.source, ScaleSource::Stored);
            let result = outcome
                .result
                .as_ref()
                .unwrap_or_else(|| {
                    panic!("{} / {}: {:?}", scale.code_name, vector.name, outcome.error)
                });
            assert!(
                (result.score - vector.expected).abs() <= vector.tolerance + 1e-9,
                "{} / {}: expected {}, got {}",
                scale.code_name,
                vector.name,
                vector.expected,
                result.score
            );
        }
    }
}

#[test]
fn test_installed_scales_share_one_input_map() {
    let db = Database::open_in_memory().unwrap();
    let evaluator = Evaluator::new();
    for code_name in ["curb_65", "cockcroft_gault"] {
        let reference = medscale_core::reference::get_reference_scale(code_name).unwrap();
        db.store_scale(&reference.to_scale().unwrap(), &reference.variables())
            .unwrap();
    }

    let mut shared: Inputs = ["confusion", "bun", "rr", "bp", "age_65_or_older"]
        .iter()
        .map(|name| (name.to_string(), InputValue::new("Yes")))
        .collect();
    shared.insert("age".into(), InputValue::new(65.0));
    shared.insert("sex".into(), InputValue::new("male"));
    shared.insert("weight".into(), InputValue::with_unit(80.0, "kg"));
    shared.insert("creatinine".into(), InputValue::new(2.0));

    let report = ScalePipeline::new(&db, &evaluator)
        .calculate(&["curb_65".into(), "cockcroft_gault".into()], &shared, "en")
        .unwrap();
    let curb = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!(curb.score, 5.0);
    assert!(curb.interpretation.contains("27.8%"));
    let clearance = report.outcomes[1].result.as_ref().unwrap();
    assert!((clearance.score - 41.6667).abs() < 0.001);
}
