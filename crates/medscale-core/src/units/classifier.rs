//! Heuristic classification of variable names and descriptions.
//!
//! Rules are tried in order; the first match wins. Analyte rules come
//! before generic ones so "serum creatinine" is not read as a plain
//! concentration, and an exclusion rule keeps "body mass index" out of Mass.

use super::MeasurementCategory;

/// A textual pattern.
#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// Substring of the normalized text.
    Fragment(&'static str),
    /// Whole token of the normalized text.
    Word(&'static str),
}

use Pattern::{Fragment, Word};

struct Rule {
    category: MeasurementCategory,
    patterns: &'static [Pattern],
}

const RULES: &[Rule] = &[
    Rule {
        category: MeasurementCategory::Gfr,
        patterns: &[
            Fragment("gfr"),
            Fragment("filtration"),
            Fragment("filtracao"),
            Fragment("filtração"),
            Fragment("filtracion"),
            Fragment("filtración"),
            Fragment("tfg"),
        ],
    },
    Rule {
        category: MeasurementCategory::Glucose,
        patterns: &[
            Fragment("glucose"),
            Fragment("glicose"),
            Fragment("glucosa"),
            Fragment("glycemia"),
            Fragment("glicemia"),
            Fragment("glucemia"),
            Fragment("blood sugar"),
        ],
    },
    Rule {
        category: MeasurementCategory::Creatinine,
        patterns: &[Fragment("creatinin"), Word("cr"), Word("scr")],
    },
    Rule {
        category: MeasurementCategory::Cholesterol,
        patterns: &[
            Fragment("cholesterol"),
            Fragment("colesterol"),
            Word("hdl"),
            Word("ldl"),
        ],
    },
    Rule {
        category: MeasurementCategory::Hemoglobin,
        patterns: &[
            Fragment("hemoglobin"),
            Fragment("haemoglobin"),
            Word("hb"),
            Word("hgb"),
        ],
    },
    Rule {
        category: MeasurementCategory::Bilirubin,
        patterns: &[Fragment("bilirrubin"), Fragment("bilirubin")],
    },
    Rule {
        category: MeasurementCategory::Sodium,
        patterns: &[
            Fragment("sodium"),
            Fragment("sodio"),
            Fragment("sódio"),
            Word("natremia"),
            Word("na"),
        ],
    },
    Rule {
        category: MeasurementCategory::Calcium,
        patterns: &[
            Fragment("calcium"),
            Fragment("calcio"),
            Fragment("cálcio"),
            Word("ca"),
        ],
    },
    Rule {
        category: MeasurementCategory::Albumin,
        patterns: &[Fragment("albumin")],
    },
    Rule {
        category: MeasurementCategory::Urea,
        patterns: &[Fragment("urea"), Fragment("ureia"), Fragment("uréia"), Word("bun")],
    },
    Rule {
        category: MeasurementCategory::Temperature,
        patterns: &[
            Fragment("temperature"),
            Fragment("temperatura"),
            Fragment("fever"),
            Fragment("febre"),
            Fragment("fiebre"),
            Word("temp"),
        ],
    },
    Rule {
        category: MeasurementCategory::HeartRate,
        patterns: &[
            Fragment("heart rate"),
            Fragment("pulse"),
            Fragment("frequencia cardiaca"),
            Fragment("frequência cardíaca"),
            Fragment("frecuencia cardiaca"),
            Fragment("frecuencia cardíaca"),
            Word("pulso"),
            Word("hr"),
            Word("fc"),
            Word("bpm"),
        ],
    },
    Rule {
        category: MeasurementCategory::RespiratoryRate,
        patterns: &[
            Fragment("respiratory rate"),
            Fragment("respiration rate"),
            Fragment("breathing rate"),
            Fragment("frequencia respiratoria"),
            Fragment("frequência respiratória"),
            Fragment("frecuencia respiratoria"),
            Word("rr"),
            Word("fr"),
        ],
    },
    Rule {
        category: MeasurementCategory::Pressure,
        patterns: &[
            Fragment("pressure"),
            Fragment("pressao"),
            Fragment("pressão"),
            Fragment("presion"),
            Fragment("presión"),
            Fragment("systolic"),
            Fragment("diastolic"),
            Fragment("sistolica"),
            Fragment("sistólica"),
            Fragment("diastolica"),
            Fragment("diastólica"),
            Word("sbp"),
            Word("dbp"),
            Word("bp"),
            Word("pa"),
            Word("map"),
        ],
    },
    Rule {
        category: MeasurementCategory::Age,
        patterns: &[
            Word("age"),
            Word("idade"),
            Word("edad"),
            Fragment("years old"),
            Fragment("anos de idade"),
        ],
    },
    Rule {
        category: MeasurementCategory::Other,
        patterns: &[
            Word("bmi"),
            Word("imc"),
            Fragment("mass index"),
            Fragment("massa corporal"),
            Fragment("masa corporal"),
        ],
    },
    Rule {
        category: MeasurementCategory::Mass,
        patterns: &[
            Fragment("weight"),
            Fragment("peso"),
            Word("mass"),
            Word("massa"),
            Word("masa"),
        ],
    },
    Rule {
        category: MeasurementCategory::Length,
        patterns: &[
            Fragment("height"),
            Fragment("length"),
            Fragment("altura"),
            Fragment("estatura"),
            Fragment("comprimento"),
            Fragment("longitud"),
            Fragment("circumference"),
            Fragment("circunferencia"),
            Fragment("circunferência"),
        ],
    },
    Rule {
        category: MeasurementCategory::Area,
        patterns: &[
            Fragment("surface area"),
            Fragment("superficie corporal"),
            Fragment("superfície corporal"),
            Word("bsa"),
            Word("area"),
            Word("área"),
        ],
    },
    Rule {
        category: MeasurementCategory::Volume,
        patterns: &[
            Fragment("volume"),
            Fragment("volumen"),
            Fragment("urine output"),
            Fragment("diurese"),
            Fragment("diuresis"),
        ],
    },
    Rule {
        category: MeasurementCategory::Time,
        patterns: &[
            Fragment("duration"),
            Fragment("duracao"),
            Fragment("duração"),
            Fragment("duracion"),
            Fragment("duración"),
            Word("time"),
            Word("tempo"),
            Word("tiempo"),
        ],
    },
    Rule {
        category: MeasurementCategory::Concentration,
        patterns: &[
            Fragment("concentration"),
            Fragment("concentracao"),
            Fragment("concentração"),
            Fragment("concentracion"),
            Fragment("concentración"),
            Word("level"),
            Word("nivel"),
            Word("nível"),
            Word("serum"),
            Word("serico"),
            Word("sérico"),
        ],
    },
];

/// Lowercase and turn `_`/`-` into spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}

impl Pattern {
    fn matches(&self, normalized: &str, tokens: &[&str]) -> bool {
        match self {
            Fragment(fragment) => normalized.contains(fragment),
            Word(word) => tokens.contains(word),
        }
    }
}

/// Classify free text (a variable name or description).
pub fn classify(text: &str) -> MeasurementCategory {
    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    RULES
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| p.matches(&normalized, &tokens)))
        .map(|rule| rule.category)
        .unwrap_or(MeasurementCategory::Other)
}
