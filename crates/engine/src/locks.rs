//! Per-session write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Registry of per-session async mutexes.
///
/// Chunk acceptance and streaming ingestion hold the session's lock for the
/// duration of validate-then-commit so two writers can never interleave their
/// read-modify-write of the session counters. Sessions are independent; no
/// cross-session ordering is imposed.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a session, creating it on first use.
    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(map.entry(session_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the registry entry if no caller still holds or awaits the lock.
    ///
    /// Call after releasing a guard so terminal sessions do not pin map
    /// entries forever.
    pub fn release(&self, session_id: Uuid) {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(lock) = map.get(&session_id)
            && Arc::strong_count(lock) == 1
        {
            map.remove(&session_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
