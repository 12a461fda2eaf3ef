//! Shared application state.

use ferry_core::config::AppConfig;
use ferry_engine::{
    ChunkSequencer, ExpiryReaper, ProgressNotifier, SessionLifecycleManager, SessionLocks,
    StreamingAssembler,
};
use ferry_metadata::MetadataStore;
use ferry_storage::ObjectStore;
use std::sync::Arc;

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub lifecycle: Arc<SessionLifecycleManager>,
    pub sequencer: Arc<ChunkSequencer>,
    pub assembler: Arc<StreamingAssembler>,
    pub reaper: Arc<ExpiryReaper>,
}

impl AppState {
    /// Wire the engine components over the given backends.
    ///
    /// Panics on an invalid engine configuration; a server that would
    /// misbehave must not start.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Self {
        if let Err(e) = config.engine.validate() {
            panic!("invalid engine configuration: {e}");
        }

        let locks = Arc::new(SessionLocks::new());
        let lifecycle = Arc::new(SessionLifecycleManager::new(
            Arc::clone(&metadata),
            Arc::clone(&notifier),
            config.engine.clone(),
        ));
        let sequencer = Arc::new(ChunkSequencer::new(
            Arc::clone(&metadata),
            Arc::clone(&storage),
            Arc::clone(&locks),
            Arc::clone(&notifier),
        ));
        let assembler = Arc::new(StreamingAssembler::new(
            Arc::clone(&metadata),
            Arc::clone(&storage),
            Arc::clone(&locks),
            Arc::clone(&notifier),
            config.engine.stream_chunk_size,
        ));
        let reaper = Arc::new(ExpiryReaper::new(
            Arc::clone(&metadata),
            Arc::clone(&notifier),
            config.engine.clone(),
        ));

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            lifecycle,
            sequencer,
            assembler,
            reaper,
        }
    }
}
