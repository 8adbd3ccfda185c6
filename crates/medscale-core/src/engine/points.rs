//! Sum-of-points and piecewise-range scoring.

use super::{ResolvedInputs, ResolvedValue};
use crate::models::{parse_integer_code, RangeBucket, Variable, VariableContribution};

/// Points for a categorical answer: weight, integer-like code, else 0.
fn categorical_points(name: &str, code: &str, points: Option<f64>) -> f64 {
    if let Some(points) = points {
        return points;
    }
    if let Some(points) = parse_integer_code(code) {
        return points;
    }
    tracing::warn!(variable = name, code, "Categorical answer carries no points; counting 0");
    0.0
}

/// Sum every declared variable's contribution. Never fails once inputs
/// are resolved.
pub fn sum_of_points(
    variables: &[Variable],
    inputs: &ResolvedInputs,
) -> (f64, Vec<VariableContribution>) {
    let mut total = 0.0;
    let mut breakdown = Vec::with_capacity(variables.len());

    for variable in variables {
        let Some(value) = inputs.get(&variable.name) else {
            continue;
        };
        let contribution = match value {
            ResolvedValue::Categorical { code, points } => {
                categorical_points(&variable.name, code, *points)
            }
            ResolvedValue::Numerical { value } => *value,
        };
        total += contribution;
        breakdown.push(VariableContribution {
            variable: variable.name.clone(),
            value: value.display(),
            contribution,
        });
    }

    (total, breakdown)
}

/// First bucket containing the value.
pub fn find_bucket(buckets: &[RangeBucket], value: f64) -> Option<&RangeBucket> {
    buckets.iter().find(|bucket| bucket.contains(value))
}
