//! # Input Validation: Storage and Repository Names

use crate::validation::error::ValidationError;
use crate::validation::limits::MAX_NAME_LENGTH;
use crate::validation::result::ValidationResult;

/// Validate a storage or repository name.
///
/// Names become directory names under the data directory, so they are limited to
/// ASCII letters, digits, `.`, `-` and `_`, and may not start with a dot.
pub fn validate_name(name: &str) -> ValidationResult<String> {
    if name.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: name.len(),
            max: MAX_NAME_LENGTH,
        });
    }

    if name.starts_with('.') {
        return Err(ValidationError::InvalidFormat {
            reason: "names cannot start with a dot".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: name.to_string(),
        });
    }

    Ok(name.to_string())
}
