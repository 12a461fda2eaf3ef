//! Shared test harness for engine integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::config::EngineConfig;
use ferry_core::{Checksum, InitiateUpload, SessionId, UploadSession};
use ferry_engine::{
    ChunkSequencer, ExpiryReaper, IncomingChunk, ProgressEvent, ProgressNotifier,
    SessionLifecycleManager, SessionLocks, StreamingAssembler,
};
use ferry_metadata::{MetadataStore, SqliteStore};
use ferry_storage::backends::filesystem::FilesystemBackend;
use ferry_storage::ObjectStore;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Internal chunk boundary used across engine tests.
pub const TEST_BOUNDARY: u64 = 64;

/// Notifier that records every event for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(SessionId, ProgressEvent)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(SessionId, ProgressEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressNotifier for RecordingNotifier {
    async fn notify(&self, session_id: SessionId, event: ProgressEvent) {
        self.events.lock().unwrap().push((session_id, event));
    }
}

/// Fully wired engine over a temp directory.
pub struct TestEngine {
    pub _temp: TempDir,
    pub store: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub lifecycle: SessionLifecycleManager,
    pub sequencer: ChunkSequencer,
    pub assembler: StreamingAssembler,
    pub reaper: ExpiryReaper,
    pub config: EngineConfig,
}

impl TestEngine {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            min_chunk_size: 1,
            stream_chunk_size: TEST_BOUNDARY,
            ..EngineConfig::default()
        };

        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp.path().join("storage"))
                .await
                .unwrap(),
        );
        let locks = Arc::new(SessionLocks::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let lifecycle = SessionLifecycleManager::new(
            Arc::clone(&store),
            notifier.clone() as Arc<dyn ProgressNotifier>,
            config.clone(),
        );
        let sequencer = ChunkSequencer::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            Arc::clone(&locks),
            notifier.clone() as Arc<dyn ProgressNotifier>,
        );
        let assembler = StreamingAssembler::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            Arc::clone(&locks),
            notifier.clone() as Arc<dyn ProgressNotifier>,
            TEST_BOUNDARY,
        );
        let reaper = ExpiryReaper::new(
            Arc::clone(&store),
            notifier.clone() as Arc<dyn ProgressNotifier>,
            config.clone(),
        );

        Self {
            _temp: temp,
            store,
            storage,
            notifier,
            lifecycle,
            sequencer,
            assembler,
            reaper,
            config,
        }
    }

    /// Initiate a session with the given sizes and default metadata.
    pub async fn initiate(&self, total_size: u64, chunk_size: u64) -> UploadSession {
        self.lifecycle
            .initiate(InitiateUpload {
                file_name: "data.bin".to_string(),
                mime_type: Some("application/octet-stream".to_string()),
                total_size,
                chunk_size,
                checksum: None,
                owner_id: "tester".to_string(),
                chatroom_id: None,
                thread_id: None,
            })
            .await
            .unwrap()
    }
}

/// Build a well-formed chunk from a payload.
pub fn chunk(index: u64, payload: &[u8], is_final: bool) -> IncomingChunk {
    IncomingChunk {
        chunk_index: index,
        size: payload.len() as u64,
        checksum: Checksum::compute(payload),
        payload: Bytes::copy_from_slice(payload),
        is_final,
    }
}
