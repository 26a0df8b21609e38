//! Response text rules. The client checks them before any network call and the
//! server checks them again on submit.

pub const MIN_RESPONSE_CHARS: usize = 10;
pub const MAX_RESPONSE_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("response must not be empty")]
    Empty,

    #[error("response must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("response must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
}

/// Validate a free-text response and return it trimmed.
///
/// Length is counted in characters after trimming surrounding whitespace.
pub fn validate_response(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();

    if chars == 0 {
        return Err(ValidationError::Empty);
    }
    if chars < MIN_RESPONSE_CHARS {
        return Err(ValidationError::TooShort {
            min: MIN_RESPONSE_CHARS,
            actual: chars,
        });
    }
    if chars > MAX_RESPONSE_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_RESPONSE_CHARS,
            actual: chars,
        });
    }
    Ok(trimmed)
}
