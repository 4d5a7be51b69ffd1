//! # Error Handling and Response Types
//!
//! Every fallible operation in the repository server returns [`AppResult`]. The
//! [`AppError`] variants mirror the failure modes of the namespace, resolver and
//! upload pipeline so that callers can react to each one specifically, and each
//! variant maps to a machine-readable [`ErrorCode`] and an HTTP status.
//!
//! ## Error Response Format
//!
//! ```json
//! {
//!   "success": false,
//!   "error": "Artifact 'org/example/lib/1.0.0/lib-1.0.0.jar' is already published and immutable",
//!   "code": "immutable_artifact",
//!   "details": null,
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! Coordinate parsing and policy errors are raised before anything is written.
//! Commit conflicts and timeouts are raised after staging and always imply that
//! staged data was discarded. [`AppError::StorageUnavailable`] is the only kind
//! that signals a broken storage medium.

use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub success: bool,          // Always false, matches the `{success, data}` envelope
    pub error: String,          // Human-readable error message
    pub code: String,           // Machine-readable error code
    pub details: Option<Value>, // Additional error details
    pub timestamp: String,      // ISO 8601 timestamp
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedCoordinate,
    NotACoordinate,
    PathTooDeep,
    NotFound,
    ImmutableArtifact,
    ChecksumMismatch,
    ConcurrentWriteConflict,
    StagingTimeout,
    PolicyRejected,
    RepositoryInactive,
    PathConflict,
    InvalidDescriptor,
    ValidationError,
    PayloadTooLarge,
    AuthError,
    StorageUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedCoordinate => "malformed_coordinate",
            ErrorCode::NotACoordinate => "not_a_coordinate",
            ErrorCode::PathTooDeep => "path_too_deep",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ImmutableArtifact => "immutable_artifact",
            ErrorCode::ChecksumMismatch => "checksum_mismatch",
            ErrorCode::ConcurrentWriteConflict => "concurrent_write_conflict",
            ErrorCode::StagingTimeout => "staging_timeout",
            ErrorCode::PolicyRejected => "policy_rejected",
            ErrorCode::RepositoryInactive => "repository_inactive",
            ErrorCode::PathConflict => "path_conflict",
            ErrorCode::InvalidDescriptor => "invalid_descriptor",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::StorageUnavailable => "storage_unavailable",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::MalformedCoordinate
            | ErrorCode::NotACoordinate
            | ErrorCode::InvalidDescriptor
            | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::ChecksumMismatch | ErrorCode::PolicyRejected => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::PathTooDeep | ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ImmutableArtifact
            | ErrorCode::ConcurrentWriteConflict
            | ErrorCode::PathConflict => StatusCode::CONFLICT,
            ErrorCode::StagingTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCode::RepositoryInactive => StatusCode::FORBIDDEN,
            ErrorCode::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed coordinate '{input}': {reason}")]
    MalformedCoordinate { input: String, reason: String },

    #[error("Path '{path}' does not denote an artifact coordinate")]
    NotACoordinate { path: String },

    #[error("Path '{path}' continues below the artifact '{leaf}'")]
    PathTooDeep { path: String, leaf: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Artifact '{path}' is already published and immutable")]
    ImmutableArtifact { path: String },

    #[error("Checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: String, computed: String },

    #[error("Another upload to '{path}' was committed first; restage and retry")]
    ConcurrentWriteConflict { path: String },

    #[error("Upload exceeded the {seconds}s limit while {stage}")]
    StagingTimeout { stage: &'static str, seconds: u64 },

    #[error("Rejected by repository policy: {0}")]
    PolicyRejected(String),

    #[error("Repository '{storage}/{repository}' is not active")]
    RepositoryInactive { storage: String, repository: String },

    #[error("Path '{path}' conflicts with an existing {existing}")]
    PathConflict { path: String, existing: &'static str },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::MalformedCoordinate { .. } => ErrorCode::MalformedCoordinate,
            AppError::NotACoordinate { .. } => ErrorCode::NotACoordinate,
            AppError::PathTooDeep { .. } => ErrorCode::PathTooDeep,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::ImmutableArtifact { .. } => ErrorCode::ImmutableArtifact,
            AppError::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            AppError::ConcurrentWriteConflict { .. } => ErrorCode::ConcurrentWriteConflict,
            AppError::StagingTimeout { .. } => ErrorCode::StagingTimeout,
            AppError::PolicyRejected(_) => ErrorCode::PolicyRejected,
            AppError::RepositoryInactive { .. } => ErrorCode::RepositoryInactive,
            AppError::PathConflict { .. } => ErrorCode::PathConflict,
            AppError::InvalidDescriptor(_) => ErrorCode::InvalidDescriptor,
            AppError::Validation(ValidationError::FileTooLarge { .. }) => {
                ErrorCode::PayloadTooLarge
            }
            AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::Multipart(_)
            | AppError::Json(_) => ErrorCode::ValidationError,
            AppError::Unauthorized(_) => ErrorCode::AuthError,
            AppError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            AppError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::ChecksumMismatch { declared, computed } => {
                Some(json!({"declared": declared, "computed": computed}))
            }
            AppError::PathTooDeep { leaf, .. } => Some(json!({"leaf": leaf})),
            AppError::StorageUnavailable(e) => Some(json!({"kind": format!("{:?}", e.kind())})),
            _ => None,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_response = self.to_error_response();
        let status = self.error_code().http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = %error_response.code, "Request failed");
        } else {
            tracing::warn!(error = %self, code = %error_response.code, "Request rejected");
        }

        tracing::debug!(status = %status, code = %error_response.code, "Returning standardized error response");

        (status, axum::Json(error_response)).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
