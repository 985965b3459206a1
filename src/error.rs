/// Unified error types for the upload service
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the upload service
#[derive(Error, Debug)]
pub enum UploadError {
    /// Client path resolves outside the storage root
    #[error("Path escapes storage root: {0}")]
    Escape(String),

    /// Verification token does not match the path and declared length
    #[error("Invalid verification key")]
    Authorization,

    /// Request body ended before the declared length was received
    #[error("Upload truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    /// Blob or metadata already exists at the target location
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object is missing or incomplete
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request headers or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Declared length is over the configured upload ceiling
    #[error("Upload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Metadata sidecar could not be encoded or decoded
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// HTTP status and the plain-text body sent to the client
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            UploadError::Escape(_) | UploadError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            UploadError::Authorization => (StatusCode::FORBIDDEN, "Invalid verification key"),
            UploadError::Truncated { .. } | UploadError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            UploadError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            UploadError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
            }
            UploadError::Metadata(_) | UploadError::Internal(_) | UploadError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Convert UploadError to a plain-text HTTP response
impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            // Don't leak details
            tracing::error!(error = %self, "request failed");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

/// Result type alias for upload operations
pub type UploadResult<T> = Result<T, UploadError>;
