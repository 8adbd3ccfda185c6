//! Clinical input variables.

use serde::{Deserialize, Serialize};

use super::LocalizedText;

/// A named clinical input shared across scales.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    /// Stable lowercase identifier (e.g. "creatinine")
    pub name: String,
    /// Display name per language
    #[serde(default)]
    pub medical_name: LocalizedText,
    /// Human-readable label, also used as the extraction prompt
    #[serde(default)]
    pub description: String,
    /// Categorical or numerical metadata
    pub kind: VariableKind,
}

/// Type-specific metadata. Categorical variables never carry units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableKind {
    Categorical {
        /// Ordered answer codes
        options: Vec<CategoricalOption>,
    },
    Numerical {
        /// Unit every value is normalized to before scoring
        #[serde(default, skip_serializing_if = "Option::is_none")]
        standard_unit: Option<String>,
        /// Units a caller may supply
        #[serde(default)]
        possible_units: Vec<String>,
        /// Lower bound in the standard unit
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Upper bound in the standard unit
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

/// One allowed answer of a categorical variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoricalOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

impl CategoricalOption {
    pub fn new(value: impl Into<String>, points: f64) -> Self {
        Self {
            value: value.into(),
            label: None,
            points: Some(points),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Point weight, falling back to an integer-like code.
    pub fn resolved_points(&self) -> Option<f64> {
        self.points.or_else(|| parse_integer_code(&self.value))
    }
}

/// Parse codes shaped like `-?\d+`.
pub fn parse_integer_code(code: &str) -> Option<f64> {
    let trimmed = code.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i64>().ok().map(|n| n as f64)
}

/// Normalize a free-form name into a code name: lowercase, alphanumerics
/// joined by single underscores.
pub fn normalize_code_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

impl Variable {
    /// Create a categorical variable.
    pub fn categorical(
        name: &str,
        description: impl Into<String>,
        options: Vec<CategoricalOption>,
    ) -> Self {
        let description = description.into();
        Self {
            name: name.to_string(),
            medical_name: LocalizedText::english(description.clone()),
            description,
            kind: VariableKind::Categorical { options },
        }
    }

    /// Create a numerical variable with a standard unit.
    pub fn numerical(
        name: &str,
        description: impl Into<String>,
        standard_unit: Option<&str>,
    ) -> Self {
        let description = description.into();
        Self {
            name: name.to_string(),
            medical_name: LocalizedText::english(description.clone()),
            description,
            kind: VariableKind::Numerical {
                standard_unit: standard_unit.map(str::to_string),
                possible_units: standard_unit.map(|u| vec![u.to_string()]).unwrap_or_default(),
                min: None,
                max: None,
            },
        }
    }

    /// Replace the accepted units (numerical only).
    pub fn with_units(mut self, units: &[&str]) -> Self {
        if let VariableKind::Numerical { possible_units, .. } = &mut self.kind {
            *possible_units = units.iter().map(|u| u.to_string()).collect();
        }
        self
    }

    /// Set bounds in the standard unit (numerical only).
    pub fn with_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        if let VariableKind::Numerical { min, max, .. } = &mut self.kind {
            *min = lower;
            *max = upper;
        }
        self
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, VariableKind::Categorical { .. })
    }

    /// Categorical options, empty for numerical variables.
    pub fn options(&self) -> &[CategoricalOption] {
        match &self.kind {
            VariableKind::Categorical { options } => options,
            VariableKind::Numerical { .. } => &[],
        }
    }

    /// Standard unit of a numerical variable.
    pub fn standard_unit(&self) -> Option<&str> {
        match &self.kind {
            VariableKind::Numerical { standard_unit, .. } => standard_unit.as_deref(),
            VariableKind::Categorical { .. } => None,
        }
    }
}
