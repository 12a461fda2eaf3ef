//! Background expiry sweep.

use crate::error::EngineResult;
use crate::notifier::{ProgressEvent, ProgressNotifier};
use ferry_core::config::EngineConfig;
use ferry_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};

/// Cancels sessions whose deadline passed while still accepting chunks.
pub struct ExpiryReaper {
    store: Arc<dyn MetadataStore>,
    notifier: Arc<dyn ProgressNotifier>,
    config: EngineConfig,
}

impl ExpiryReaper {
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

    /// Run one sweep, returning the number of sessions cancelled.
    ///
    /// Batches are drained until a short one, so a backlog larger than the
    /// batch limit clears in a single sweep rather than one batch per
    /// interval. Each session is moved with a status-guarded update, so a
    /// sweep racing an in-flight writer on the same session loses cleanly:
    /// whichever reaches a terminal state first wins and the other observes
    /// it.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> EngineResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut cancelled = 0u64;

        loop {
            let expired = self
                .store
                .get_expired_sessions(now, self.config.sweep_batch_limit)
                .await?;
            let batch_len = expired.len();

            for row in expired {
                let session_id = row.session_id;
                let moved = self
                    .store
                    .update_status_guarded(
                        session_id,
                        &["pending", "in_progress"],
                        "cancelled",
                        now,
                    )
                    .await?;
                if !moved {
                    continue;
                }
                cancelled += 1;

                if let Ok(session) = row.into_domain() {
                    self.notifier
                        .notify(
                            session.session_id,
                            ProgressEvent {
                                uploaded_bytes: session.uploaded_bytes,
                                total_size: session.total_size,
                                progress_percentage: session.progress_percentage(),
                                status: ferry_core::SessionStatus::Cancelled,
                            },
                        )
                        .await;
                }
            }

            // Rows that lost the guard turned terminal and drop out of the
            // next query, so a short batch is the only exit.
            if batch_len < self.config.sweep_batch_limit as usize {
                break;
            }
        }

        if cancelled > 0 {
            info!(cancelled, "expiry sweep cancelled sessions");
        }
        Ok(cancelled)
    }

    /// Interval between sweeps, as configured.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1))
    }
}
