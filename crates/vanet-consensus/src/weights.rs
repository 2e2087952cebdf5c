//! Validation helpers shared by every weighted score in the workspace.

use crate::error::{Error, Result};

/// Allowed drift of a weight set's sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Check that a weight set is non-negative and sums to 1.0.
pub fn validate_weight_set(set: &'static str, weights: &[f64]) -> Result<()> {
    for &value in weights {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::WeightOutOfRange { set, value });
        }
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::WeightSum { set, sum });
    }
    Ok(())
}

/// Check that a value lies in [0, 1].
pub fn validate_unit(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::OutOfUnitRange { name, value });
    }
    Ok(())
}

/// Check that a value is finite and strictly positive.
pub fn validate_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::NotPositive { name, value });
    }
    Ok(())
}
