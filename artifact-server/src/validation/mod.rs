//! # Input Validation Utilities
//!
//! Security-focused helpers used before any user-provided value reaches the
//! filesystem: storage and repository names, repository path segments, and size
//! limits for uploads.

pub mod error;
pub mod limits;
pub mod names;
pub mod paths;
pub mod result;

pub use self::{
    error::ValidationError,
    limits::{
        validate_file_size, MAX_COORDINATE_LENGTH, MAX_DESCRIPTOR_SIZE, MAX_MULTIPART_FIELDS,
        MAX_NAME_LENGTH, MAX_PATH_DEPTH, MAX_REQUEST_BODY_SIZE, MAX_SEGMENT_LENGTH,
        MAX_UPLOAD_SIZE,
    },
    names::validate_name,
    paths::{validate_safe_path, validate_segment, validate_segments},
    result::ValidationResult,
};
