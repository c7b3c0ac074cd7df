//! Validation helper functions for policy types.

use crate::core::errors::{RepoqError, Result};

/// Validate that a usize value is greater than zero.
pub fn validate_positive_usize(value: usize, field: &str) -> Result<()> {
    if value == 0 {
        return Err(RepoqError::policy_field(
            format!("{} must be greater than 0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is greater than zero.
pub fn validate_positive_f64(value: f64, field: &str) -> Result<()> {
    if value <= 0.0 {
        return Err(RepoqError::policy_field(
            format!("{} must be greater than 0.0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is non-negative.
pub fn validate_non_negative(value: f64, field: &str) -> Result<()> {
    if value < 0.0 || !value.is_finite() {
        return Err(RepoqError::policy_field(
            format!("{} must be a finite non-negative number", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is in the unit range [0.0, 1.0].
pub fn validate_unit_range(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RepoqError::policy_field(
            format!("{} must be between 0.0 and 1.0", field),
            field,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_range_rejects_out_of_bounds() {
        assert!(validate_unit_range(0.0, "tau").is_ok());
        assert!(validate_unit_range(1.0, "tau").is_ok());
        assert!(validate_unit_range(1.01, "tau").is_err());
        assert!(validate_unit_range(-0.5, "tau").is_err());
    }

    #[test]
    fn non_negative_rejects_nan() {
        assert!(validate_non_negative(f64::NAN, "epsilon").is_err());
        assert!(validate_non_negative(0.0, "epsilon").is_ok());
    }
}
