//! Input validation helpers shared by every subsystem.

use crate::core::error::{ObservabilityError, ObservabilityResult};

/// Trim `value` and check its length in characters.
///
/// Returns the trimmed string so callers store the canonical form.
pub fn validate_name(
    value: &str,
    field: &str,
    min_length: usize,
    max_length: Option<usize>,
) -> ObservabilityResult<String> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();

    if trimmed.is_empty() && min_length > 0 {
        return Err(ObservabilityError::validation(field, format!("{} cannot be empty", field)));
    }

    if length < min_length {
        return Err(ObservabilityError::validation(
            field,
            format!("{} must be at least {} characters", field, min_length),
        ));
    }

    if let Some(max) = max_length {
        if length > max {
            return Err(ObservabilityError::validation(
                field,
                format!("{} must be at most {} characters", field, max),
            ));
        }
    }

    Ok(trimmed.to_string())
}

/// Shorthand for a name that only has to be non-empty
pub fn validate_non_empty(value: &str, field: &str) -> ObservabilityResult<String> {
    validate_name(value, field, 1, None)
}

/// Reject NaN and negative values
pub fn validate_non_negative(value: f64, field: &str, reason: &str) -> ObservabilityResult<()> {
    if value.is_nan() || value < 0.0 {
        return Err(ObservabilityError::validation(field, format!("{}, got {}", reason, value)));
    }
    Ok(())
}

/// Buckets must be non-empty, finite and strictly ascending
pub fn validate_buckets(buckets: &[f64]) -> ObservabilityResult<()> {
    if buckets.is_empty() {
        return Err(ObservabilityError::validation("buckets", "buckets cannot be empty"));
    }

    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(ObservabilityError::validation("buckets", "bucket boundaries must be finite"));
    }

    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ObservabilityError::validation(
            "buckets",
            "bucket boundaries must be strictly ascending",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(validate_non_empty("  requests  ", "name").unwrap(), "requests");
    }

    #[test]
    fn test_empty_and_blank_names_rejected() {
        assert!(validate_non_empty("", "name").is_err());
        assert!(validate_non_empty("   ", "name").is_err());
    }

    #[test]
    fn test_max_length() {
        let long = "x".repeat(201);
        assert!(validate_name(&long, "name", 1, Some(200)).is_err());
        assert!(validate_name(&long[..200], "name", 1, Some(200)).is_ok());
    }

    #[test]
    fn test_non_negative() {
        assert!(validate_non_negative(0.0, "value", "must be >= 0").is_ok());
        assert!(validate_non_negative(-0.5, "value", "must be >= 0").is_err());
        assert!(validate_non_negative(f64::NAN, "value", "must be >= 0").is_err());
    }

    #[test]
    fn test_buckets() {
        assert!(validate_buckets(&[0.1, 0.5, 1.0]).is_ok());
        assert!(validate_buckets(&[]).is_err());
        assert!(validate_buckets(&[0.5, 0.1]).is_err());
        assert!(validate_buckets(&[0.5, 0.5]).is_err());
        assert!(validate_buckets(&[0.5, f64::INFINITY]).is_err());
    }
}
