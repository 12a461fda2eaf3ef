//! Database models mapping to the metadata schema.
//!
//! Byte counts are stored as SQLite INTEGER (i64); conversions to and from
//! the u64 domain types validate the i64 boundary in both directions.

use crate::error::{MetadataError, MetadataResult};
use ferry_core::{Checksum, ChunkReceipt, SessionStatus, UploadSession};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub session_id: Uuid,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub total_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub uploaded_chunks: i64,
    pub uploaded_bytes: i64,
    pub status: String,
    pub checksum: Option<String>,
    pub owner_id: String,
    pub chatroom_id: Option<String>,
    pub thread_id: Option<String>,
    pub storage_key: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub expires_at: OffsetDateTime,
    /// Short failure reason, set when status becomes 'failed'.
    pub error_detail: Option<String>,
}

/// Chunk receipt record. One row per accepted chunk, append-only.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkReceiptRow {
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub size_bytes: i64,
    pub checksum: String,
    pub object_key: String,
    pub received_at: OffsetDateTime,
}

fn to_i64(value: u64, field: &str) -> MetadataResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetadataError::Constraint(format!("{field} {value} exceeds i64 range")))
}

fn to_u64(value: i64, field: &str) -> MetadataResult<u64> {
    u64::try_from(value)
        .map_err(|_| MetadataError::Corrupt(format!("{field} {value} is negative")))
}

impl UploadSessionRow {
    /// Build a row from a domain session.
    pub fn from_domain(session: &UploadSession) -> MetadataResult<Self> {
        Ok(Self {
            session_id: *session.session_id.as_uuid(),
            file_name: session.file_name.clone(),
            mime_type: session.mime_type.clone(),
            total_size: to_i64(session.total_size, "total_size")?,
            chunk_size: to_i64(session.chunk_size, "chunk_size")?,
            total_chunks: to_i64(session.total_chunks, "total_chunks")?,
            uploaded_chunks: to_i64(session.uploaded_chunks, "uploaded_chunks")?,
            uploaded_bytes: to_i64(session.uploaded_bytes, "uploaded_bytes")?,
            status: session.status.as_str().to_string(),
            checksum: session.checksum.as_ref().map(Checksum::to_hex),
            owner_id: session.owner_id.clone(),
            chatroom_id: session.chatroom_id.clone(),
            thread_id: session.thread_id.clone(),
            storage_key: session.storage_key.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            completed_at: session.completed_at,
            expires_at: session.expires_at,
            error_detail: None,
        })
    }

    /// Convert back to the domain type.
    pub fn into_domain(self) -> MetadataResult<UploadSession> {
        let status = SessionStatus::parse(&self.status)
            .map_err(|e| MetadataError::Corrupt(e.to_string()))?;
        let checksum = self
            .checksum
            .as_deref()
            .map(Checksum::from_hex)
            .transpose()
            .map_err(|e| MetadataError::Corrupt(e.to_string()))?;
        Ok(UploadSession {
            session_id: self.session_id.into(),
            file_name: self.file_name,
            mime_type: self.mime_type,
            total_size: to_u64(self.total_size, "total_size")?,
            chunk_size: to_u64(self.chunk_size, "chunk_size")?,
            total_chunks: to_u64(self.total_chunks, "total_chunks")?,
            uploaded_chunks: to_u64(self.uploaded_chunks, "uploaded_chunks")?,
            uploaded_bytes: to_u64(self.uploaded_bytes, "uploaded_bytes")?,
            status,
            checksum,
            owner_id: self.owner_id,
            chatroom_id: self.chatroom_id,
            thread_id: self.thread_id,
            storage_key: self.storage_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            expires_at: self.expires_at,
        })
    }
}

impl ChunkReceiptRow {
    /// Build a row from a domain receipt.
    pub fn from_domain(session_id: Uuid, receipt: &ChunkReceipt) -> MetadataResult<Self> {
        Ok(Self {
            session_id,
            chunk_index: to_i64(receipt.chunk_index, "chunk_index")?,
            size_bytes: to_i64(receipt.size, "size_bytes")?,
            checksum: receipt.checksum.to_hex(),
            object_key: receipt.object_key.clone(),
            received_at: receipt.received_at,
        })
    }

    /// Convert back to the domain type.
    pub fn into_domain(self) -> MetadataResult<ChunkReceipt> {
        let checksum = Checksum::from_hex(&self.checksum)
            .map_err(|e| MetadataError::Corrupt(e.to_string()))?;
        Ok(ChunkReceipt {
            chunk_index: to_u64(self.chunk_index, "chunk_index")?,
            size: to_u64(self.size_bytes, "size_bytes")?,
            checksum,
            object_key: self.object_key,
            received_at: self.received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::InitiateUpload;

    fn sample_session() -> UploadSession {
        UploadSession::new(
            InitiateUpload {
                file_name: "photo.jpg".to_string(),
                mime_type: Some("image/jpeg".to_string()),
                total_size: 10,
                chunk_size: 4,
                checksum: Some(Checksum::compute(b"whole file")),
                owner_id: "user-7".to_string(),
                chatroom_id: Some("room-1".to_string()),
                thread_id: None,
            },
            time::Duration::hours(24),
        )
        .unwrap()
    }

    #[test]
    fn test_session_row_roundtrip() {
        let session = sample_session();
        let row = UploadSessionRow::from_domain(&session).unwrap();
        let back = row.into_domain().unwrap();
        assert_eq!(back.session_id, session.session_id);
        assert_eq!(back.total_chunks, 3);
        assert_eq!(back.status, SessionStatus::Pending);
        assert_eq!(back.checksum, session.checksum);
        assert_eq!(back.storage_key, session.storage_key);
    }

    #[test]
    fn test_corrupt_status_rejected() {
        let session = sample_session();
        let mut row = UploadSessionRow::from_domain(&session).unwrap();
        row.status = "exploded".to_string();
        assert!(matches!(
            row.into_domain(),
            Err(MetadataError::Corrupt(_))
        ));
    }

    #[test]
    fn test_receipt_row_roundtrip() {
        let receipt = ChunkReceipt {
            chunk_index: 2,
            size: 4096,
            checksum: Checksum::compute(b"chunk"),
            object_key: "uploads/user-7/123_abcd_photo.jpg_chunk_2".to_string(),
            received_at: OffsetDateTime::now_utc(),
        };
        let row = ChunkReceiptRow::from_domain(Uuid::new_v4(), &receipt).unwrap();
        let back = row.into_domain().unwrap();
        assert_eq!(back.chunk_index, 2);
        assert_eq!(back.size, 4096);
        assert_eq!(back.checksum, receipt.checksum);
    }
}
