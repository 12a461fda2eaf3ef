mod common;

use common::TestEngine;
use ferry_core::{InitiateUpload, SessionId, SessionStatus};
use ferry_engine::EngineError;

fn params(total_size: u64, chunk_size: u64) -> InitiateUpload {
    InitiateUpload {
        file_name: "video.mp4".to_string(),
        mime_type: Some("video/mp4".to_string()),
        total_size,
        chunk_size,
        checksum: None,
        owner_id: "alice".to_string(),
        chatroom_id: Some("room-9".to_string()),
        thread_id: None,
    }
}

#[tokio::test]
async fn test_initiate_creates_pending_session() {
    let engine = TestEngine::new().await;
    let session = engine.lifecycle.initiate(params(100, 40)).await.unwrap();

    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.total_chunks, 3);
    assert_eq!(session.uploaded_chunks, 0);
    assert_eq!(session.uploaded_bytes, 0);
    assert!(session.completed_at.is_none());
    assert!(session.expires_at > session.created_at);

    let fetched = engine.lifecycle.get(session.session_id).await.unwrap();
    assert_eq!(fetched.session_id, session.session_id);
    assert_eq!(fetched.chatroom_id.as_deref(), Some("room-9"));

    // Initiation emits no progress event; the first chunk does.
    assert!(engine.notifier.events().is_empty());
}

#[tokio::test]
async fn test_initiate_rejects_zero_total_size() {
    let engine = TestEngine::new().await;
    let err = engine.lifecycle.initiate(params(0, 40)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_initiate_rejects_oversized_total() {
    let engine = TestEngine::new().await;
    let too_big = engine.config.max_total_size + 1;
    let err = engine
        .lifecycle
        .initiate(params(too_big, 40))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_initiate_rejects_chunk_size_out_of_bounds() {
    let engine = TestEngine::new().await;
    let err = engine
        .lifecycle
        .initiate(params(100, engine.config.max_chunk_size + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_get_unknown_session_is_not_found() {
    let engine = TestEngine::new().await;
    let err = engine.lifecycle.get(SessionId::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(100, 40).await;

    let cancelled = engine.lifecycle.cancel(session.session_id).await.unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    // Second cancel is a no-op, not an error.
    let again = engine.lifecycle.cancel(session.session_id).await.unwrap();
    assert_eq!(again.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_completed_session_fails() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(8, 8).await;
    engine
        .sequencer
        .accept_chunk(session.session_id, common::chunk(0, &[1u8; 8], false))
        .await
        .unwrap();

    let err = engine
        .lifecycle
        .cancel(session.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn test_cancel_emits_progress_event() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(100, 40).await;
    engine.lifecycle.cancel(session.session_id).await.unwrap();

    let events = engine.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, session.session_id);
    assert_eq!(events[0].1.status, SessionStatus::Cancelled);
}
