//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::{ChunkReceiptRow, UploadSessionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload session operations.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Create a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Get an upload session by ID.
    async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Atomically record one accepted chunk.
    ///
    /// Inserts the receipt and advances the session counters in a single
    /// transaction, guarded on `uploaded_chunks` still being
    /// `expected_uploaded_chunks` and the session still accepting chunks.
    /// Returns `false` without writing anything if the guard did not match,
    /// meaning a concurrent writer advanced the session first.
    async fn append_receipt(
        &self,
        receipt: &ChunkReceiptRow,
        expected_uploaded_chunks: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Transition session status, guarded on the current status.
    ///
    /// Returns `false` if the session's status was not one of `from`, in
    /// which case nothing was written.
    async fn update_status_guarded(
        &self,
        session_id: Uuid,
        from: &[&str],
        to: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Mark a session completed, setting `completed_at` exactly once.
    /// Returns `false` if the session was not active.
    async fn complete_session(
        &self,
        session_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Mark a session failed with a short reason.
    async fn fail_session(
        &self,
        session_id: Uuid,
        error_detail: &str,
        failed_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Get all chunk receipts for a session, ordered by chunk index.
    async fn get_receipts(&self, session_id: Uuid) -> MetadataResult<Vec<ChunkReceiptRow>>;

    /// Get active sessions whose deadline has passed, oldest first.
    async fn get_expired_sessions(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Count sessions that can still accept chunks.
    async fn count_active_sessions(&self) -> MetadataResult<u64>;

    /// Delete a session and its receipts.
    async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()>;
}
