//! Progress notification sink.

use async_trait::async_trait;
use ferry_core::{SessionId, SessionStatus};
use serde::Serialize;

/// A progress event emitted on every session state change.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    pub uploaded_bytes: u64,
    pub total_size: u64,
    pub progress_percentage: u8,
    pub status: SessionStatus,
}

/// Sink for upload progress events.
///
/// Implementations forward to whatever real-time transport is in use.
/// Notification failures must not fail the upload, so this interface is
/// infallible; implementations log and swallow their own errors.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, session_id: SessionId, event: ProgressEvent);
}

/// Notifier that logs events via tracing. Default when no transport is wired.
pub struct LogNotifier;

#[async_trait]
impl ProgressNotifier for LogNotifier {
    async fn notify(&self, session_id: SessionId, event: ProgressEvent) {
        tracing::debug!(
            session_id = %session_id,
            uploaded_bytes = event.uploaded_bytes,
            total_size = event.total_size,
            progress = event.progress_percentage,
            status = %event.status,
            "upload progress"
        );
    }
}
