//! Strict in-order chunk acceptance.

use crate::error::{EngineError, EngineResult};
use crate::locks::SessionLocks;
use crate::notifier::{ProgressEvent, ProgressNotifier};
use bytes::Bytes;
use ferry_core::{size, Checksum, ChunkReceipt, SessionId, SessionStatus, UploadSession};
use ferry_metadata::models::ChunkReceiptRow;
use ferry_metadata::MetadataStore;
use ferry_storage::ObjectStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

/// Bound on compare-and-set retries before surfacing a conflict.
const MAX_CAS_RETRIES: u32 = 3;

/// An incoming chunk on the discrete upload path.
#[derive(Clone, Debug)]
pub struct IncomingChunk {
    /// Position in the upload (0-indexed); must equal `uploaded_chunks`.
    pub chunk_index: u64,
    /// Declared size in bytes; must match the payload length.
    pub size: u64,
    /// SHA-256 checksum of the payload.
    pub checksum: Checksum,
    /// Chunk payload.
    pub payload: Bytes,
    /// Whether this is the last chunk of the upload.
    pub is_final: bool,
}

/// Validates and commits chunks in strict order.
///
/// Writers hold the session's lock across validate-then-commit; the metadata
/// layer's guarded counter update is kept as a second line of defense so a
/// lost race can never corrupt the sequence invariant.
pub struct ChunkSequencer {
    store: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    locks: Arc<SessionLocks>,
    notifier: Arc<dyn ProgressNotifier>,
}

impl ChunkSequencer {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        locks: Arc<SessionLocks>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Self {
        Self {
            store,
            storage,
            locks,
            notifier,
        }
    }

    /// Accept one chunk for a session.
    ///
    /// On success the receipt is appended, counters advance, and the updated
    /// snapshot is returned. Progress is notified on success and on the
    /// closed/expired outcomes so observers reflect terminal states promptly.
    #[instrument(skip(self, chunk), fields(session_id = %session_id, chunk_index = chunk.chunk_index))]
    pub async fn accept_chunk(
        &self,
        session_id: SessionId,
        chunk: IncomingChunk,
    ) -> EngineResult<UploadSession> {
        let uuid = *session_id.as_uuid();
        let guard = self.locks.acquire(uuid).await;
        let result = self.accept_chunk_locked(session_id, chunk).await;
        drop(guard);
        self.locks.release(uuid);
        result
    }

    async fn accept_chunk_locked(
        &self,
        session_id: SessionId,
        chunk: IncomingChunk,
    ) -> EngineResult<UploadSession> {
        let mut session = self.fetch(session_id).await?;

        if session.status.is_terminal() {
            self.notify(&session).await;
            return Err(EngineError::SessionClosed {
                session_id,
                status: session.status,
            });
        }

        if session.is_expired() {
            // Expiry is observed lazily here as well as by the sweep; the
            // session moves to cancelled as a side effect.
            self.store
                .update_status_guarded(
                    *session_id.as_uuid(),
                    &["pending", "in_progress"],
                    "cancelled",
                    OffsetDateTime::now_utc(),
                )
                .await?;
            session.status = SessionStatus::Cancelled;
            self.notify(&session).await;
            return Err(EngineError::SessionExpired(session_id));
        }

        self.validate_chunk(&session, &chunk)?;

        chunk
            .checksum
            .verify(&chunk.payload)
            .map_err(|e| match e {
                ferry_core::Error::ChecksumMismatch { expected, actual } => {
                    EngineError::ChecksumMismatch { expected, actual }
                }
                other => EngineError::Core(other),
            })?;

        // Persist the payload before committing the receipt: a crash between
        // the two leaves an orphan chunk object, never a receipt without data.
        let object_key = session.chunk_object_key(chunk.chunk_index);
        self.storage
            .put(&object_key, chunk.payload.clone(), None)
            .await?;

        let receipt = ChunkReceipt {
            chunk_index: chunk.chunk_index,
            size: chunk.size,
            checksum: chunk.checksum,
            object_key,
            received_at: OffsetDateTime::now_utc(),
        };

        let session = self
            .commit_receipt(session_id, session, &receipt, chunk.is_final)
            .await?;
        self.notify(&session).await;

        info!(
            session_id = %session_id,
            chunk_index = receipt.chunk_index,
            uploaded_chunks = session.uploaded_chunks,
            status = %session.status,
            "chunk accepted"
        );
        Ok(session)
    }

    fn validate_chunk(&self, session: &UploadSession, chunk: &IncomingChunk) -> EngineResult<()> {
        if chunk.chunk_index != session.uploaded_chunks {
            return Err(EngineError::OutOfSequence {
                expected: session.uploaded_chunks,
                received: chunk.chunk_index,
            });
        }
        if chunk.payload.len() as u64 != chunk.size {
            return Err(EngineError::InvalidChunkSize {
                expected: chunk.size,
                received: chunk.payload.len() as u64,
            });
        }
        // The final chunk may carry the remainder; every other chunk must be
        // exactly the session's declared chunk size.
        if !chunk.is_final && chunk.size != session.chunk_size {
            return Err(EngineError::InvalidChunkSize {
                expected: session.chunk_size,
                received: chunk.size,
            });
        }
        if chunk.is_final && chunk.size > session.chunk_size {
            return Err(EngineError::InvalidChunkSize {
                expected: session.chunk_size,
                received: chunk.size,
            });
        }
        let new_total = size::checked_add_bytes(session.uploaded_bytes, chunk.size)?;
        if new_total > session.total_size {
            return Err(EngineError::InvalidChunkSize {
                expected: session.total_size - session.uploaded_bytes,
                received: chunk.size,
            });
        }
        Ok(())
    }

    /// Commit the receipt with a guarded counter advance, retried on conflict.
    async fn commit_receipt(
        &self,
        session_id: SessionId,
        mut session: UploadSession,
        receipt: &ChunkReceipt,
        is_final: bool,
    ) -> EngineResult<UploadSession> {
        let uuid = *session_id.as_uuid();
        let row = ChunkReceiptRow::from_domain(uuid, receipt)?;

        for attempt in 0..MAX_CAS_RETRIES {
            let expected = i64::try_from(session.uploaded_chunks)
                .map_err(|_| EngineError::Conflict(session_id))?;
            let applied = self
                .store
                .append_receipt(&row, expected, OffsetDateTime::now_utc())
                .await?;
            if applied {
                let done = is_final || session.uploaded_chunks + 1 == session.total_chunks;
                if done {
                    // The upload is only complete once the final object is in
                    // the store; an assembly failure moves the session to
                    // failed with the intermediates kept for inspection.
                    let snapshot = self.fetch(session_id).await?;
                    if let Err(e) = crate::assembler::assemble_final_object(
                        &self.store,
                        &self.storage,
                        &snapshot,
                    )
                    .await
                    {
                        error!(session_id = %session_id, error = %e, "assembly failed");
                        self.store
                            .fail_session(uuid, &e.to_string(), OffsetDateTime::now_utc())
                            .await?;
                        let mut failed = snapshot;
                        failed.status = SessionStatus::Failed;
                        self.notify(&failed).await;
                        return Err(e);
                    }
                    self.store
                        .complete_session(uuid, OffsetDateTime::now_utc())
                        .await?;
                }
                return self.fetch(session_id).await;
            }

            // Guard miss: someone advanced the session under us. Re-read and
            // re-check the sequence position before retrying.
            warn!(
                session_id = %session_id,
                attempt = attempt + 1,
                "concurrent counter advance detected, revalidating"
            );
            session = self.fetch(session_id).await?;
            if session.status.is_terminal() {
                return Err(EngineError::SessionClosed {
                    session_id,
                    status: session.status,
                });
            }
            if receipt.chunk_index != session.uploaded_chunks {
                return Err(EngineError::OutOfSequence {
                    expected: session.uploaded_chunks,
                    received: receipt.chunk_index,
                });
            }
        }
        Err(EngineError::Conflict(session_id))
    }

    async fn fetch(&self, session_id: SessionId) -> EngineResult<UploadSession> {
        let row = self
            .store
            .get_session(*session_id.as_uuid())
            .await?
            .ok_or(EngineError::NotFound(session_id))?;
        Ok(row.into_domain()?)
    }

    async fn notify(&self, session: &UploadSession) {
        self.notifier
            .notify(
                session.session_id,
                ProgressEvent {
                    uploaded_bytes: session.uploaded_bytes,
                    total_size: session.total_size,
                    progress_percentage: session.progress_percentage(),
                    status: session.status,
                },
            )
            .await;
    }
}
