//! Request and response bodies for the upload API.
//!
//! Byte-count fields cross the wire as decimal strings so JavaScript clients
//! never lose precision above 2^53; chunk counts stay numeric.

use ferry_core::{SessionStatus, UploadSession};
use ferry_engine::ResumePosition;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Serde adapter: u64 as a decimal string.
pub mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid byte count: {s:?}")))
    }
}

/// Serde adapter: optional u64 as a decimal string.
pub mod u64_string_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid byte count: {s:?}"))),
        }
    }
}

/// Body of `POST /v1/uploads`.
#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(with = "u64_string")]
    pub total_size: u64,
    /// Defaults to the server's standard chunk size when omitted.
    #[serde(default, with = "u64_string_opt")]
    pub chunk_size: Option<u64>,
    /// Optional whole-file SHA-256 checksum, hex-encoded.
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub chatroom_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Body of `POST /v1/uploads/{session_id}/chunks`.
#[derive(Debug, Deserialize)]
pub struct ChunkRequest {
    pub chunk_index: u64,
    #[serde(with = "u64_string")]
    pub chunk_size: u64,
    /// SHA-256 checksum of the decoded payload, hex-encoded.
    pub checksum: String,
    /// Base64-encoded chunk payload.
    pub chunk_data: String,
    #[serde(default)]
    pub is_final_chunk: bool,
}

/// Client-facing session snapshot.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(with = "u64_string")]
    pub total_size: u64,
    #[serde(with = "u64_string")]
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub uploaded_chunks: u64,
    #[serde(with = "u64_string")]
    pub uploaded_bytes: u64,
    pub status: SessionStatus,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatroom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<UploadSession> for SessionView {
    fn from(s: UploadSession) -> Self {
        Self {
            session_id: s.session_id.to_string(),
            progress_percentage: s.progress_percentage(),
            file_name: s.file_name,
            mime_type: s.mime_type,
            total_size: s.total_size,
            chunk_size: s.chunk_size,
            total_chunks: s.total_chunks,
            uploaded_chunks: s.uploaded_chunks,
            uploaded_bytes: s.uploaded_bytes,
            status: s.status,
            checksum: s.checksum.map(|c| c.to_hex()),
            owner_id: s.owner_id,
            chatroom_id: s.chatroom_id,
            thread_id: s.thread_id,
            created_at: s.created_at,
            updated_at: s.updated_at,
            completed_at: s.completed_at,
            expires_at: s.expires_at,
        }
    }
}

/// Response of `GET /v1/uploads/{session_id}/stats`.
#[derive(Debug, Serialize)]
pub struct StatsView {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(with = "u64_string")]
    pub uploaded_bytes: u64,
    #[serde(with = "u64_string")]
    pub total_bytes: u64,
    pub progress_percentage: u8,
    pub elapsed_seconds: f64,
    pub bytes_per_second: f64,
    /// Absent until enough bytes have flowed to estimate a rate, and for
    /// sessions that are no longer active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds_remaining: Option<f64>,
}

impl StatsView {
    /// Derive throughput stats from a snapshot, relative to `now`.
    pub fn from_session(session: &UploadSession, now: OffsetDateTime) -> Self {
        let elapsed_seconds = (now - session.created_at).as_seconds_f64().max(0.0);
        let bytes_per_second = if elapsed_seconds > 0.0 {
            session.uploaded_bytes as f64 / elapsed_seconds
        } else {
            0.0
        };
        let remaining = session.total_size.saturating_sub(session.uploaded_bytes);
        let estimated_seconds_remaining =
            if session.status.is_active() && bytes_per_second > 0.0 && remaining > 0 {
                Some(remaining as f64 / bytes_per_second)
            } else {
                None
            };
        Self {
            session_id: session.session_id.to_string(),
            status: session.status,
            uploaded_bytes: session.uploaded_bytes,
            total_bytes: session.total_size,
            progress_percentage: session.progress_percentage(),
            elapsed_seconds,
            bytes_per_second,
            estimated_seconds_remaining,
        }
    }
}

/// Response of `POST /v1/uploads/{session_id}/resume`.
#[derive(Debug, Serialize)]
pub struct ResumeView {
    #[serde(with = "u64_string")]
    pub resume_byte_offset: u64,
    pub next_chunk_index: u64,
}

impl From<ResumePosition> for ResumeView {
    fn from(p: ResumePosition) -> Self {
        Self {
            resume_byte_offset: p.resume_byte_offset,
            next_chunk_index: p.next_chunk_index,
        }
    }
}
