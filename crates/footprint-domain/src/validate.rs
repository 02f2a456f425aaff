//! Garde validation utilities.

use crate::error::{DomainError, ValidationError};
use garde::Validate;

/// Validate a struct, converting the garde report into a field-level error.
///
/// Garde reports errors in field declaration order; only the first one is
/// surfaced, matching the short-circuit contract of the validator.
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value.validate().map_err(|report| {
        let (field, message) = report
            .iter()
            .next()
            .map(|(path, error)| (path.to_string(), error.to_string()))
            .unwrap_or_else(|| ("payload".to_string(), "invalid".to_string()));
        DomainError::Validation(ValidationError { field, message })
    })
}
