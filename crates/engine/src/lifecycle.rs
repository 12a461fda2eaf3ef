//! Session lifecycle management: initiate, get, cancel.

use crate::error::{EngineError, EngineResult};
use crate::notifier::{ProgressEvent, ProgressNotifier};
use ferry_core::config::EngineConfig;
use ferry_core::{InitiateUpload, SessionId, SessionStatus, UploadSession};
use ferry_metadata::models::UploadSessionRow;
use ferry_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};

/// Creates, fetches, and cancels upload sessions, enforcing the lifecycle
/// state machine and the configured size policy.
pub struct SessionLifecycleManager {
    store: Arc<dyn MetadataStore>,
    notifier: Arc<dyn ProgressNotifier>,
    config: EngineConfig,
}

impl SessionLifecycleManager {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        notifier: Arc<dyn ProgressNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Create a new upload session.
    ///
    /// Rejects a zero or over-limit total size and a chunk size outside the
    /// configured bounds. The first accepted chunk, not initiation, emits the
    /// first progress notification.
    #[instrument(skip(self, params), fields(file_name = %params.file_name, owner = %params.owner_id))]
    pub async fn initiate(&self, params: InitiateUpload) -> EngineResult<UploadSession> {
        if params.total_size == 0 {
            return Err(EngineError::InvalidParameters(
                "total_size must be greater than zero".to_string(),
            ));
        }
        if params.total_size > self.config.max_total_size {
            return Err(EngineError::InvalidParameters(format!(
                "total_size {} exceeds maximum {}",
                params.total_size, self.config.max_total_size
            )));
        }
        if params.chunk_size < self.config.min_chunk_size
            || params.chunk_size > self.config.max_chunk_size
        {
            return Err(EngineError::InvalidParameters(format!(
                "chunk_size {} outside allowed range [{}, {}]",
                params.chunk_size, self.config.min_chunk_size, self.config.max_chunk_size
            )));
        }

        let session = UploadSession::new(params, self.config.session_ttl())?;
        let row = UploadSessionRow::from_domain(&session)?;
        self.store.create_session(&row).await?;

        info!(
            session_id = %session.session_id,
            total_size = session.total_size,
            total_chunks = session.total_chunks,
            "upload session created"
        );
        Ok(session)
    }

    /// Get a session by ID.
    pub async fn get(&self, session_id: SessionId) -> EngineResult<UploadSession> {
        let row = self
            .store
            .get_session(*session_id.as_uuid())
            .await?
            .ok_or(EngineError::NotFound(session_id))?;
        Ok(row.into_domain()?)
    }

    /// Cancel a session.
    ///
    /// Fails on completed sessions; cancelling an already-cancelled session
    /// is a no-op returning the current snapshot.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn cancel(&self, session_id: SessionId) -> EngineResult<UploadSession> {
        let session = self.get(session_id).await?;
        match session.status {
            SessionStatus::Completed => return Err(EngineError::AlreadyCompleted(session_id)),
            SessionStatus::Cancelled => return Ok(session),
            SessionStatus::Failed => {
                return Err(EngineError::SessionClosed {
                    session_id,
                    status: session.status,
                });
            }
            SessionStatus::Pending | SessionStatus::InProgress => {}
        }

        let moved = self
            .store
            .update_status_guarded(
                *session_id.as_uuid(),
                &["pending", "in_progress"],
                "cancelled",
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !moved {
            // A concurrent writer reached a terminal state first; re-read and
            // report based on what actually won.
            let current = self.get(session_id).await?;
            return match current.status {
                SessionStatus::Cancelled => Ok(current),
                SessionStatus::Completed => Err(EngineError::AlreadyCompleted(session_id)),
                status => Err(EngineError::SessionClosed { session_id, status }),
            };
        }

        let cancelled = self.get(session_id).await?;
        self.notifier
            .notify(
                session_id,
                ProgressEvent {
                    uploaded_bytes: cancelled.uploaded_bytes,
                    total_size: cancelled.total_size,
                    progress_percentage: cancelled.progress_percentage(),
                    status: cancelled.status,
                },
            )
            .await;
        info!(session_id = %session_id, "upload session cancelled");
        Ok(cancelled)
    }
}
