//! Upload session types and lifecycle.

use crate::checksum::Checksum;
use crate::size;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Canonical prefix for session identifiers.
const SESSION_ID_PREFIX: &str = "upload_session_";

/// Unique identifier for an upload session.
///
/// Rendered as `upload_session_<uuid-v4>` everywhere a string form is needed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical `upload_session_<uuid>` form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let raw = s
            .strip_prefix(SESSION_ID_PREFIX)
            .ok_or_else(|| crate::Error::InvalidSessionId(format!("missing prefix: {s}")))?;
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SESSION_ID_PREFIX}{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, no chunk accepted yet.
    Pending,
    /// At least one chunk accepted.
    InProgress,
    /// All bytes received and the final object is assembled.
    Completed,
    /// Explicitly cancelled, or force-expired by the reaper.
    Cancelled,
    /// An unrecoverable I/O error occurred during assembly.
    Failed,
}

impl SessionStatus {
    /// Check if the session can still accept chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Check whether the lifecycle graph allows moving to `next`.
    ///
    /// Terminal states have no outgoing transitions; Failed is reachable
    /// from any non-terminal state (assembly I/O errors), Cancelled from any
    /// non-terminal state (explicit cancel or expiry).
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Self::Pending, Self::InProgress) => true,
            (Self::Pending | Self::InProgress, Self::Completed) => true,
            (Self::Pending | Self::InProgress, Self::Cancelled) => true,
            (Self::Pending | Self::InProgress, Self::Failed) => true,
            _ => false,
        }
    }

    /// Stable string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A receipt for one accepted chunk. Append-only, ordered by `chunk_index`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkReceipt {
    /// Position in the upload (0-indexed).
    pub chunk_index: u64,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 checksum of the chunk payload.
    pub checksum: Checksum,
    /// Object store key holding the chunk payload.
    pub object_key: String,
    /// When the chunk was accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

/// Parameters for creating a new upload session.
#[derive(Clone, Debug)]
pub struct InitiateUpload {
    /// Original file name, informational only.
    pub file_name: String,
    /// Declared MIME type.
    pub mime_type: Option<String>,
    /// Total upload size in bytes.
    pub total_size: u64,
    /// Chunk size fixed for the life of the session.
    pub chunk_size: u64,
    /// Optional whole-file checksum.
    pub checksum: Option<Checksum>,
    /// Owner identity (opaque, supplied by the auth layer).
    pub owner_id: String,
    /// Optional chatroom association (opaque).
    pub chatroom_id: Option<String>,
    /// Optional thread association (opaque).
    pub thread_id: Option<String>,
}

/// An upload session tracking chunked upload state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub session_id: SessionId,
    /// Original file name, informational only.
    pub file_name: String,
    /// Declared MIME type.
    pub mime_type: Option<String>,
    /// Total upload size in bytes.
    pub total_size: u64,
    /// Chunk size for this session.
    pub chunk_size: u64,
    /// Expected number of chunks: ceil(total_size / chunk_size).
    pub total_chunks: u64,
    /// Chunks accepted so far, monotonically non-decreasing.
    pub uploaded_chunks: u64,
    /// Bytes accepted so far, monotonically non-decreasing.
    pub uploaded_bytes: u64,
    /// Current session status.
    pub status: SessionStatus,
    /// Optional whole-file checksum declared at initiation.
    pub checksum: Option<Checksum>,
    /// Owner identity (opaque).
    pub owner_id: String,
    /// Optional chatroom association (opaque).
    pub chatroom_id: Option<String>,
    /// Optional thread association (opaque).
    pub thread_id: Option<String>,
    /// Canonical object store key for the assembled file.
    pub storage_key: String,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// When the session completed, set exactly once.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new session from validated initiation parameters.
    ///
    /// Callers are expected to have validated size bounds already; this only
    /// derives the chunk count and storage key.
    pub fn new(params: InitiateUpload, expires_in: time::Duration) -> crate::Result<Self> {
        let now = OffsetDateTime::now_utc();
        let total_chunks = size::chunk_count(params.total_size, params.chunk_size)?;
        let session_id = SessionId::new();
        let storage_key = derive_storage_key(&params.owner_id, &params.file_name, now);
        Ok(Self {
            session_id,
            file_name: params.file_name,
            mime_type: params.mime_type,
            total_size: params.total_size,
            chunk_size: params.chunk_size,
            total_chunks,
            uploaded_chunks: 0,
            uploaded_bytes: 0,
            status: SessionStatus::Pending,
            checksum: params.checksum,
            owner_id: params.owner_id,
            chatroom_id: params.chatroom_id,
            thread_id: params.thread_id,
            storage_key,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: now + expires_in,
        })
    }

    /// Check if the session deadline has passed.
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Progress percentage, capped at 100.
    pub fn progress_percentage(&self) -> u8 {
        size::progress_percentage(self.uploaded_bytes, self.total_size)
    }

    /// Object store key for an intermediate chunk of this session.
    pub fn chunk_object_key(&self, chunk_index: u64) -> String {
        format!("{}_chunk_{}", self.storage_key, chunk_index)
    }

    /// Expected size of the chunk at `index` for this session.
    pub fn expected_chunk_size(&self, index: u64) -> u64 {
        size::expected_chunk_size(index, self.total_size, self.chunk_size)
    }
}

/// Derive the canonical storage key for a session.
///
/// Combines creation time, a random suffix, and the owner id so concurrent
/// uploads of the same file name by the same owner cannot collide.
fn derive_storage_key(owner_id: &str, file_name: &str, created_at: OffsetDateTime) -> String {
    let millis = created_at.unix_timestamp_nanos() / 1_000_000;
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_string();
    format!(
        "uploads/{}/{}_{}_{}",
        sanitize_key_component(owner_id),
        millis,
        suffix,
        sanitize_key_component(file_name)
    )
}

/// Restrict a key component to a path-safe character set.
///
/// Dot-dot sequences are rewritten as well so the result can never trip the
/// object store's traversal guard.
fn sanitize_key_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.replace("..", "__");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
