//! Engine error types.

use ferry_core::{SessionId, SessionStatus};
use thiserror::Error;

/// Errors raised by the upload engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session {session_id} is closed: {status}")]
    SessionClosed {
        session_id: SessionId,
        status: SessionStatus,
    },

    #[error("session {0} has expired")]
    SessionExpired(SessionId),

    #[error("session {0} is already completed")]
    AlreadyCompleted(SessionId),

    #[error("out of sequence: expected chunk {expected}, received {received}")]
    OutOfSequence { expected: u64, received: u64 },

    #[error("invalid chunk size: expected {expected} bytes, received {received}")]
    InvalidChunkSize { expected: u64, received: u64 },

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("conflicting concurrent update on session {0}")]
    Conflict(SessionId),

    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] ferry_core::Error),

    #[error(transparent)]
    Storage(#[from] ferry_storage::StorageError),

    #[error(transparent)]
    Metadata(#[from] ferry_metadata::MetadataError),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
