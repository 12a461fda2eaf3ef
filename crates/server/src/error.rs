//! API error type and HTTP mappings.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ferry_engine::EngineError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Errors returned by API handlers.
///
/// Every variant carries a client-facing message; the stable machine-readable
/// code comes from [`ApiError::code`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SessionClosed(String),

    #[error("{0}")]
    SessionExpired(String),

    #[error("{0}")]
    AlreadyCompleted(String),

    #[error("{0}")]
    OutOfSequence(String),

    #[error("{0}")]
    InvalidChunkSize(String),

    #[error("{0}")]
    ChecksumMismatch(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_parameters",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::SessionClosed(_) => "session_closed",
            Self::SessionExpired(_) => "session_expired",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::OutOfSequence(_) => "out_of_sequence",
            Self::InvalidChunkSize(_) => "invalid_chunk_size",
            Self::ChecksumMismatch(_) => "checksum_mismatch",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::SessionClosed(_)
            | Self::SessionExpired(_)
            | Self::AlreadyCompleted(_)
            | Self::OutOfSequence(_)
            | Self::InvalidChunkSize(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ChecksumMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(%status, code, message, "request failed");
        } else {
            debug!(%status, code, message, "request rejected");
        }
        crate::metrics::record_upload_error(code);

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(_) => Self::NotFound(e.to_string()),
            EngineError::SessionClosed { .. } => Self::SessionClosed(e.to_string()),
            EngineError::SessionExpired(_) => Self::SessionExpired(e.to_string()),
            EngineError::AlreadyCompleted(_) => Self::AlreadyCompleted(e.to_string()),
            EngineError::OutOfSequence { .. } => Self::OutOfSequence(e.to_string()),
            EngineError::InvalidChunkSize { .. } => Self::InvalidChunkSize(e.to_string()),
            EngineError::ChecksumMismatch { .. } => Self::ChecksumMismatch(e.to_string()),
            EngineError::InvalidParameters(_) => Self::BadRequest(e.to_string()),
            EngineError::Conflict(_) => Self::Conflict(e.to_string()),
            EngineError::Stream(_) => Self::BadRequest(format!("upload stream aborted: {e}")),
            EngineError::Core(_) => Self::BadRequest(e.to_string()),
            EngineError::Storage(ferry_storage::StorageError::NotFound(key)) => {
                Self::NotFound(format!("object not found: {key}"))
            }
            EngineError::Storage(inner) => Self::Storage(inner.to_string()),
            EngineError::Metadata(inner) => Self::Internal(inner.to_string()),
        }
    }
}

impl From<ferry_core::Error> for ApiError {
    fn from(e: ferry_core::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<ferry_metadata::MetadataError> for ApiError {
    fn from(e: ferry_metadata::MetadataError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ferry_storage::StorageError> for ApiError {
    fn from(e: ferry_storage::StorageError) -> Self {
        match e {
            ferry_storage::StorageError::NotFound(key) => {
                Self::NotFound(format!("object not found: {key}"))
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
