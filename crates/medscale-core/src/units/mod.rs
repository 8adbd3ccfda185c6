//! Unit and measurement resolution.
//!
//! Handles:
//! - Classification of variable text into measurement categories
//! - Unit alias canonicalization (lbs→lb, °F→degF, µmol/L→umol/L)
//! - Linear and affine conversion within a category

mod classifier;
mod tables;

pub use classifier::classify;
pub use tables::UnitDef;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Cannot convert {from} to {to}")]
    Incompatible { from: String, to: String },

    #[error("Conversion from {from} to {to} depends on the analyte")]
    AnalyteDependent { from: String, to: String },
}

pub type UnitResult<T> = Result<T, UnitError>;

/// What a numeric variable measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementCategory {
    Mass,
    Length,
    Volume,
    Time,
    Age,
    Temperature,
    Pressure,
    Concentration,
    Glucose,
    Creatinine,
    Cholesterol,
    Hemoglobin,
    HeartRate,
    RespiratoryRate,
    Area,
    Gfr,
    Bilirubin,
    Sodium,
    Calcium,
    Albumin,
    Urea,
    Other,
}

impl MeasurementCategory {
    pub const ALL: [MeasurementCategory; 22] = [
        Self::Mass,
        Self::Length,
        Self::Volume,
        Self::Time,
        Self::Age,
        Self::Temperature,
        Self::Pressure,
        Self::Concentration,
        Self::Glucose,
        Self::Creatinine,
        Self::Cholesterol,
        Self::Hemoglobin,
        Self::HeartRate,
        Self::RespiratoryRate,
        Self::Area,
        Self::Gfr,
        Self::Bilirubin,
        Self::Sodium,
        Self::Calcium,
        Self::Albumin,
        Self::Urea,
        Self::Other,
    ];

    /// Unit table, standard unit first.
    pub fn units(self) -> &'static [UnitDef] {
        match self {
            Self::Mass => tables::MASS,
            Self::Length => tables::LENGTH,
            Self::Volume => tables::VOLUME,
            Self::Time => tables::TIME,
            Self::Age => tables::AGE,
            Self::Temperature => tables::TEMPERATURE,
            Self::Pressure => tables::PRESSURE,
            Self::Concentration => tables::CONCENTRATION,
            Self::Glucose => tables::GLUCOSE,
            Self::Creatinine => tables::CREATININE,
            Self::Cholesterol => tables::CHOLESTEROL,
            Self::Hemoglobin => tables::HEMOGLOBIN,
            Self::HeartRate => tables::HEART_RATE,
            Self::RespiratoryRate => tables::RESPIRATORY_RATE,
            Self::Area => tables::AREA,
            Self::Gfr => tables::GFR,
            Self::Bilirubin => tables::BILIRUBIN,
            Self::Sodium => tables::SODIUM,
            Self::Calcium => tables::CALCIUM,
            Self::Albumin => tables::ALBUMIN,
            Self::Urea => tables::UREA,
            Self::Other => &[],
        }
    }

    /// Canonical unit, `None` for `Other`.
    pub fn standard_unit(self) -> Option<&'static str> {
        self.units().first().map(|def| def.unit)
    }

    /// Interchangeable units of this category.
    pub fn compatible_units(self) -> Vec<&'static str> {
        self.units().iter().map(|def| def.unit).collect()
    }

    /// Whether conversions here hold for any substance. Analyte categories
    /// carry molar factors specific to one substance.
    pub fn is_dimensional(self) -> bool {
        matches!(
            self,
            Self::Mass
                | Self::Length
                | Self::Volume
                | Self::Time
                | Self::Age
                | Self::Temperature
                | Self::Pressure
                | Self::Concentration
                | Self::HeartRate
                | Self::RespiratoryRate
                | Self::Area
                | Self::Gfr
        )
    }

    fn find(self, unit: &str) -> Option<&'static UnitDef> {
        self.units().iter().find(|def| def.unit == unit)
    }

    /// Whether both canonical units belong to this category.
    pub fn contains(self, from: &str, to: &str) -> bool {
        self.find(from).is_some() && self.find(to).is_some()
    }
}

/// Unit resolver: alias table plus category-aware conversion.
pub struct UnitResolver {
    /// Alias map: lowercase spelling → canonical unit
    aliases: HashMap<String, String>,
}

impl Default for UnitResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitResolver {
    /// Create a resolver with default aliases.
    pub fn new() -> Self {
        Self {
            aliases: tables::default_aliases(),
        }
    }

    /// Classify a variable name or description.
    pub fn classify(&self, text: &str) -> MeasurementCategory {
        classify(text)
    }

    /// Canonical spelling of a unit, if known.
    pub fn canonicalize(&self, unit: &str) -> Option<&str> {
        let lower = unit.trim().to_lowercase();
        self.aliases
            .get(&lower)
            .or_else(|| {
                let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
                self.aliases.get(&compact)
            })
            .map(String::as_str)
    }

    /// Add a custom alias.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), canonical.to_string());
    }

    fn canonical_or_err(&self, unit: &str) -> UnitResult<&str> {
        self.canonicalize(unit)
            .ok_or_else(|| UnitError::UnknownUnit(unit.to_string()))
    }

    /// Convert between units of any dimensional category.
    ///
    /// Pairs that only convert through an analyte's molar mass
    /// (mg/dL → mmol/L) are rejected.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> UnitResult<f64> {
        let from_c = self.canonical_or_err(from)?;
        let to_c = self.canonical_or_err(to)?;
        if from_c == to_c {
            return Ok(value);
        }

        if let Some(category) = MeasurementCategory::ALL
            .iter()
            .copied()
            .find(|c| c.is_dimensional() && c.contains(from_c, to_c))
        {
            return convert_within(category, value, from_c, to_c);
        }

        let analyte = MeasurementCategory::ALL
            .iter()
            .any(|c| !c.is_dimensional() && c.contains(from_c, to_c));
        if analyte {
            Err(UnitError::AnalyteDependent {
                from: from.to_string(),
                to: to.to_string(),
            })
        } else {
            Err(UnitError::Incompatible {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Convert using one category's factors (including analyte categories).
    pub fn convert_in(
        &self,
        category: MeasurementCategory,
        value: f64,
        from: &str,
        to: &str,
    ) -> UnitResult<f64> {
        let from_c = self.canonical_or_err(from)?;
        let to_c = self.canonical_or_err(to)?;
        if from_c == to_c {
            return Ok(value);
        }
        if !category.contains(from_c, to_c) {
            return Err(UnitError::Incompatible {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        convert_within(category, value, from_c, to_c)
    }

    /// Convert a value to a category's standard unit.
    pub fn normalize_to_standard(
        &self,
        category: MeasurementCategory,
        value: f64,
        from: &str,
    ) -> UnitResult<f64> {
        match category.standard_unit() {
            Some(standard) => self.convert_in(category, value, from, standard),
            None => Ok(value),
        }
    }
}

fn convert_within(
    category: MeasurementCategory,
    value: f64,
    from: &str,
    to: &str,
) -> UnitResult<f64> {
    let incompatible = || UnitError::Incompatible {
        from: from.to_string(),
        to: to.to_string(),
    };
    let src = category.find(from).ok_or_else(incompatible)?;
    let dst = category.find(to).ok_or_else(incompatible)?;
    let standard = value * src.scale + src.offset;
    Ok((standard - dst.offset) / dst.scale)
}
