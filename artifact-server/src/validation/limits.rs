//! # Input Validation: Size Limits & Thresholds
//!
//! Constants bounding request sizes and path shapes accepted by the server.

use crate::validation::error::ValidationError;
use crate::validation::result::ValidationResult;

/// Maximum allowed file size for uploads (100 MB)
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum allowed request body size (120 MB) - allows overhead for multipart encoding
pub const MAX_REQUEST_BODY_SIZE: usize = 120 * 1024 * 1024;

/// Maximum allowed descriptor (POM) size (1 MB)
pub const MAX_DESCRIPTOR_SIZE: usize = 1024 * 1024;

/// Maximum allowed number of multipart fields
pub const MAX_MULTIPART_FIELDS: usize = 12;

/// Maximum length of a raw coordinate string
pub const MAX_COORDINATE_LENGTH: usize = 512;

/// Maximum allowed storage or repository name length
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum allowed length of a single path segment
pub const MAX_SEGMENT_LENGTH: usize = 255;

/// Maximum allowed path depth inside a repository
pub const MAX_PATH_DEPTH: usize = 32;

/// Validate file size against limits.
///
/// `max_size` defaults to [`MAX_UPLOAD_SIZE`].
pub fn validate_file_size(size: u64, max_size: Option<u64>) -> ValidationResult<()> {
    let limit = max_size.unwrap_or(MAX_UPLOAD_SIZE);

    if size > limit {
        return Err(ValidationError::FileTooLarge {
            actual: size,
            max: limit,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, None).is_ok());
        assert!(validate_file_size(MAX_UPLOAD_SIZE, None).is_ok());
        assert!(validate_file_size(MAX_UPLOAD_SIZE + 1, None).is_err());
        assert!(validate_file_size(1024, Some(512)).is_err());
    }
}
