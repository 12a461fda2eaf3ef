//! Streaming ingestion and final-object assembly.

use crate::error::{EngineError, EngineResult};
use crate::locks::SessionLocks;
use crate::notifier::{ProgressEvent, ProgressNotifier};
use bytes::{Bytes, BytesMut};
use ferry_core::{size, Checksum, ChunkReceipt, SessionId, SessionStatus, UploadSession};
use ferry_metadata::models::ChunkReceiptRow;
use ferry_metadata::MetadataStore;
use ferry_storage::{ByteStream, ObjectStore};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, instrument};

/// Resume point for a disconnected streaming client.
#[derive(Clone, Copy, Debug)]
pub struct ResumePosition {
    /// Byte offset the client should restart the stream at.
    pub resume_byte_offset: u64,
    /// Index the next internal chunk will be written as.
    pub next_chunk_index: u64,
}

/// Alternate ingestion path for callers that provide one continuous byte
/// stream instead of discrete chunk requests.
///
/// The stream is re-chunked internally at a fixed boundary; each internal
/// chunk is persisted like a discrete chunk, and on stream end the final
/// object is assembled by concatenating the chunk objects in order.
pub struct StreamingAssembler {
    store: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    locks: Arc<SessionLocks>,
    notifier: Arc<dyn ProgressNotifier>,
    chunk_boundary: u64,
}

impl StreamingAssembler {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        locks: Arc<SessionLocks>,
        notifier: Arc<dyn ProgressNotifier>,
        chunk_boundary: u64,
    ) -> Self {
        Self {
            store,
            storage,
            locks,
            notifier,
            chunk_boundary,
        }
    }

    /// Ingest a byte stream for a session, then assemble the final object.
    ///
    /// The session's lock is held for the whole call, so the streaming path
    /// has exactly one writer per session. Internal chunk indices continue
    /// from `uploaded_chunks`, which lets a disconnected client resume by
    /// restarting the stream at the offset from [`Self::resume_position`].
    #[instrument(skip(self, stream), fields(session_id = %session_id))]
    pub async fn ingest<S>(&self, session_id: SessionId, stream: S) -> EngineResult<UploadSession>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
    {
        let uuid = *session_id.as_uuid();
        let guard = self.locks.acquire(uuid).await;
        let result = self.ingest_locked(session_id, stream).await;
        drop(guard);
        self.locks.release(uuid);
        result
    }

    async fn ingest_locked<S>(
        &self,
        session_id: SessionId,
        mut stream: S,
    ) -> EngineResult<UploadSession>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
    {
        let session = self.fetch(session_id).await?;

        if session.status.is_terminal() {
            self.notify(&session).await;
            return Err(EngineError::SessionClosed {
                session_id,
                status: session.status,
            });
        }
        // Internal chunk indices are generated at the stream boundary, so the
        // session's declared chunk size must be that boundary or the
        // uploaded_chunks counter would drift from total_chunks.
        if session.chunk_size != self.chunk_boundary {
            return Err(EngineError::InvalidParameters(format!(
                "streaming ingest requires chunk_size {} to match the stream boundary {}",
                session.chunk_size, self.chunk_boundary
            )));
        }
        if session.is_expired() {
            self.store
                .update_status_guarded(
                    *session_id.as_uuid(),
                    &["pending", "in_progress"],
                    "cancelled",
                    OffsetDateTime::now_utc(),
                )
                .await?;
            let mut expired = session;
            expired.status = SessionStatus::Cancelled;
            self.notify(&expired).await;
            return Err(EngineError::SessionExpired(session_id));
        }

        let boundary = usize::try_from(self.chunk_boundary).unwrap_or(usize::MAX);
        let mut buffer = BytesMut::with_capacity(boundary.min(8 * 1024 * 1024));
        let mut session = session;
        let mut received = session.uploaded_bytes;

        // A stream or storage error here leaves the session non-terminal:
        // committed chunks stay durable and the client can resume.
        while let Some(item) = stream.next().await {
            let mut data = item?;
            received = size::checked_add_bytes(received, data.len() as u64)?;
            if received > session.total_size {
                // Over-delivery: nothing past the declared total is buffered
                // or committed, and the session stays resumable.
                return Err(EngineError::InvalidParameters(format!(
                    "stream delivered {received} bytes, exceeding declared total_size {}",
                    session.total_size
                )));
            }
            while !data.is_empty() {
                let room = boundary - buffer.len();
                let take = room.min(data.len());
                buffer.extend_from_slice(&data.split_to(take));
                if buffer.len() == boundary {
                    session = self
                        .flush_chunk(&session, buffer.split().freeze())
                        .await?;
                }
            }
        }
        if !buffer.is_empty() {
            session = self.flush_chunk(&session, buffer.split().freeze()).await?;
        }

        // Assembly failures are unrecoverable for the final object; the
        // session moves to failed but intermediate chunk objects are kept
        // for inspection.
        match assemble_final_object(&self.store, &self.storage, &session).await {
            Ok(()) => {
                self.store
                    .complete_session(*session_id.as_uuid(), OffsetDateTime::now_utc())
                    .await?;
                let completed = self.fetch(session_id).await?;
                self.notify(&completed).await;
                info!(
                    session_id = %session_id,
                    total_bytes = completed.uploaded_bytes,
                    "streaming upload assembled"
                );
                Ok(completed)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "assembly failed");
                self.store
                    .fail_session(
                        *session_id.as_uuid(),
                        &e.to_string(),
                        OffsetDateTime::now_utc(),
                    )
                    .await?;
                let mut failed = session;
                failed.status = SessionStatus::Failed;
                self.notify(&failed).await;
                Err(e)
            }
        }
    }

    /// Persist one internal chunk and advance the session counters.
    async fn flush_chunk(
        &self,
        session: &UploadSession,
        data: Bytes,
    ) -> EngineResult<UploadSession> {
        let index = session.uploaded_chunks;
        let object_key = session.chunk_object_key(index);
        let checksum = Checksum::compute(&data);
        let size = data.len() as u64;

        self.storage.put(&object_key, data, None).await?;

        let receipt = ChunkReceipt {
            chunk_index: index,
            size,
            checksum,
            object_key,
            received_at: OffsetDateTime::now_utc(),
        };
        let row = ChunkReceiptRow::from_domain(*session.session_id.as_uuid(), &receipt)?;
        let expected = i64::try_from(index)
            .map_err(|_| EngineError::Conflict(session.session_id))?;
        let applied = self
            .store
            .append_receipt(&row, expected, OffsetDateTime::now_utc())
            .await?;
        if !applied {
            // The session lock is held, so a guard miss means an external
            // transition (cancel or expiry sweep) won.
            let current = self.fetch(session.session_id).await?;
            return Err(EngineError::SessionClosed {
                session_id: session.session_id,
                status: current.status,
            });
        }

        let updated = self.fetch(session.session_id).await?;
        self.notify(&updated).await;
        Ok(updated)
    }

    /// Where a disconnected client should restart its stream.
    ///
    /// Advisory only; fails on completed sessions because there is nothing
    /// left to resume.
    pub async fn resume_position(&self, session_id: SessionId) -> EngineResult<ResumePosition> {
        let session = self.fetch(session_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(EngineError::AlreadyCompleted(session_id));
        }
        Ok(ResumePosition {
            resume_byte_offset: session.uploaded_bytes,
            next_chunk_index: session.uploaded_bytes / self.chunk_boundary,
        })
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

/// Concatenate a session's chunk objects, in index order, into the final
/// object at the canonical storage key, then delete the intermediates.
///
/// The concatenation is streamed chunk by chunk into the store, so the final
/// object never has to fit in memory. Both ingestion paths run this on
/// completion.
pub(crate) async fn assemble_final_object(
    store: &Arc<dyn MetadataStore>,
    storage: &Arc<dyn ObjectStore>,
    session: &UploadSession,
) -> EngineResult<()> {
    let receipts = store.get_receipts(*session.session_id.as_uuid()).await?;
    let chunk_keys: Vec<String> = receipts.iter().map(|r| r.object_key.clone()).collect();

    let source = Arc::clone(storage);
    let stream_keys = chunk_keys.clone();
    let concatenated: ByteStream = Box::pin(async_stream::try_stream! {
        for key in stream_keys {
            let mut chunk_stream = source.get_stream(&key).await?;
            while let Some(piece) = chunk_stream.next().await {
                yield piece?;
            }
        }
    });

    storage
        .put_stream(
            &session.storage_key,
            concatenated,
            session.mime_type.as_deref(),
        )
        .await?;

    // Only after the final object is durable do the intermediates go.
    for key in &chunk_keys {
        storage.delete(key).await?;
    }
    Ok(())
}
