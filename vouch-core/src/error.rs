//! Validation errors for malformed input
//!
//! These are rejected locally and never retried.

use thiserror::Error;

use crate::CategoryId;

/// Errors raised while validating caller input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Identifier must not be empty")]
    EmptyIdentifier,

    #[error("Identifier is {len} bytes long (max {max})")]
    IdentifierTooLong { len: usize, max: usize },

    #[error("Unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("Invalid rating value: {0}")]
    InvalidRating(i64),

    #[error("Unknown time period: {0}")]
    UnknownTimePeriod(String),

    #[error("Limit must be positive")]
    InvalidLimit,

    #[error("Decay rate must be in (0, 1], got {0}")]
    InvalidDecayRate(f64),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Check that an identifier is non-empty and bounded
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    if id.len() > crate::MAX_IDENTIFIER_LEN {
        return Err(ValidationError::IdentifierTooLong {
            len: id.len(),
            max: crate::MAX_IDENTIFIER_LEN,
        });
    }
    Ok(())
}
