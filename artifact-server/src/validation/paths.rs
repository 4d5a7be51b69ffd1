//! # Input Validation: Path and Segment Validation
//!
//! Repository paths arrive as free-form catch-all segments. Every segment is
//! checked here before it is used as a tree key or joined onto a directory.

use crate::validation::error::ValidationError;
use crate::validation::limits::{MAX_PATH_DEPTH, MAX_SEGMENT_LENGTH};
use crate::validation::result::ValidationResult;

/// Validate a single path segment.
///
/// Rejects empty segments, `.` and `..`, separators, null bytes and control
/// characters.
pub fn validate_segment(segment: &str) -> ValidationResult<()> {
    if segment.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(ValidationError::TooLong {
            actual: segment.len(),
            max: MAX_SEGMENT_LENGTH,
        });
    }

    if segment.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if segment.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if segment == "." || segment == ".." {
        return Err(ValidationError::PathTraversal {
            path: segment.to_string(),
        });
    }

    if segment.contains('/') || segment.contains('\\') {
        return Err(ValidationError::InvalidCharacters {
            input: segment.to_string(),
        });
    }

    Ok(())
}

/// Split a relative path into validated segments.
///
/// A single trailing slash is tolerated (directory URLs); absolute paths and
/// empty interior segments are not.
pub fn validate_safe_path(path: &str) -> ValidationResult<Vec<String>> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(ValidationError::AbsolutePath {
            path: path.to_string(),
        });
    }

    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    validate_segments(&segments)?;
    Ok(segments)
}

/// Validate an already split segment list.
pub fn validate_segments(segments: &[String]) -> ValidationResult<()> {
    if segments.len() > MAX_PATH_DEPTH {
        return Err(ValidationError::DepthExceeded {
            actual: segments.len(),
            max: MAX_PATH_DEPTH,
        });
    }

    for segment in segments {
        validate_segment(segment)?;
    }

    Ok(())
}
