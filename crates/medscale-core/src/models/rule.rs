//! Scoring rules: the closed set of ways a scale turns inputs into a score.

use serde::{Deserialize, Serialize};

/// How a scale computes its score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringRule {
    /// Sum of each input's point value.
    SumOfPoints,
    /// Closed-form expression over variable names.
    Formula { expression: String },
    /// Bucket lookup keyed by one input; first match wins.
    PiecewiseRange {
        input: String,
        buckets: Vec<RangeBucket>,
    },
}

/// A piecewise bucket. Bounds are inclusive and either side may be open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    pub label: String,
}

impl RangeBucket {
    pub fn new(lower: Option<f64>, upper: Option<f64>, label: impl Into<String>) -> Self {
        Self {
            lower,
            upper,
            label: label.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |lo| value >= lo) && self.upper.map_or(true, |hi| value <= hi)
    }

    /// Representative score: midpoint, or the bounded side when half-open.
    pub fn representative(&self) -> f64 {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            (Some(lo), None) => lo,
            (None, Some(hi)) => hi,
            (None, None) => 0.0,
        }
    }
}

impl ScoringRule {
    pub fn formula(expression: impl Into<String>) -> Self {
        Self::Formula {
            expression: expression.into(),
        }
    }

    /// Expression text of a formula rule.
    pub fn formula_source(&self) -> Option<&str> {
        match self {
            Self::Formula { expression } => Some(expression),
            _ => None,
        }
    }

    /// Short name used in logs and persisted metadata.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SumOfPoints => "sum_of_points",
            Self::Formula { .. } => "formula",
            Self::PiecewiseRange { .. } => "piecewise_range",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_representative() {
        assert_eq!(RangeBucket::new(Some(2.0), Some(4.0), "mid").representative(), 3.0);
        assert_eq!(RangeBucket::new(Some(10.0), None, "high").representative(), 10.0);
        assert_eq!(RangeBucket::new(None, Some(1.0), "low").representative(), 1.0);
    }

    #[test]
    fn test_bucket_bounds_inclusive() {
        let bucket = RangeBucket::new(Some(2.0), Some(4.0), "mid");
        assert!(bucket.contains(2.0));
        assert!(bucket.contains(4.0));
        assert!(!bucket.contains(4.01));
        assert!(RangeBucket::new(None, None, "any").contains(-1e9));
    }

    #[test]
    fn test_rule_serialization() {
        let rule = ScoringRule::formula("a + b");
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"type":"formula","expression":"a + b"}"#);

        let sum: ScoringRule = serde_json::from_str(r#"{"type":"sum_of_points"}"#).unwrap();
        assert_eq!(sum, ScoringRule::SumOfPoints);
    }
}
