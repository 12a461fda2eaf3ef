mod common;

use bytes::Bytes;
use common::{chunk, TestEngine};
use ferry_core::{Checksum, SessionStatus};
use ferry_engine::{EngineError, IncomingChunk};
use time::OffsetDateTime;

#[tokio::test]
async fn test_in_order_chunks_complete_session() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    let after_first = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0xAA; 5], false))
        .await
        .unwrap();
    assert_eq!(after_first.status, SessionStatus::InProgress);
    assert_eq!(after_first.uploaded_chunks, 1);
    assert_eq!(after_first.uploaded_bytes, 5);
    assert_eq!(after_first.progress_percentage(), 50);

    let done = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(1, &[0xBB; 5], false))
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.uploaded_bytes, 10);
    assert!(done.completed_at.is_some());
    assert_eq!(done.progress_percentage(), 100);
}

#[tokio::test]
async fn test_chunk_payload_persisted_before_commit() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, b"abcde", false))
        .await
        .unwrap();

    let stored = engine
        .storage
        .get(&session.chunk_object_key(0))
        .await
        .unwrap();
    assert_eq!(&stored[..], b"abcde");
}

#[tokio::test]
async fn test_chunked_completion_assembles_final_object() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0xAA; 5], false))
        .await
        .unwrap();
    let done = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(1, &[0xBB; 5], false))
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);

    // Completion means the final object is readable at the canonical key
    // and the intermediate chunk objects are gone.
    let assembled = engine.storage.get(&session.storage_key).await.unwrap();
    let mut expected = vec![0xAAu8; 5];
    expected.extend_from_slice(&[0xBB; 5]);
    assert_eq!(&assembled[..], &expected[..]);
    for index in 0..2 {
        assert!(!engine
            .storage
            .exists(&session.chunk_object_key(index))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_out_of_sequence_leaves_state_unchanged() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(3, &[0u8; 5], false))
        .await
        .unwrap_err();
    match err {
        EngineError::OutOfSequence { expected, received } => {
            assert_eq!(expected, 0);
            assert_eq!(received, 3);
        }
        other => panic!("expected OutOfSequence, got {other}"),
    }

    let unchanged = engine.lifecycle.get(session.session_id).await.unwrap();
    assert_eq!(unchanged.uploaded_chunks, 0);
    assert_eq!(unchanged.status, SessionStatus::Pending);
}

#[tokio::test]
async fn test_duplicate_chunk_rejected() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;
    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[1u8; 5], false))
        .await
        .unwrap();

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[1u8; 5], false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::OutOfSequence {
            expected: 1,
            received: 0
        }
    ));
}

#[tokio::test]
async fn test_non_final_chunk_wrong_size_rejected() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 3], false))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidChunkSize { .. }));
}

#[tokio::test]
async fn test_final_chunk_may_carry_remainder() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(7, 5).await;

    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[1u8; 5], false))
        .await
        .unwrap();
    let done = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(1, &[2u8; 2], true))
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.uploaded_bytes, 7);
}

#[tokio::test]
async fn test_declared_size_must_match_payload() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    let payload = Bytes::from_static(&[0u8; 5]);
    let lying = IncomingChunk {
        chunk_index: 0,
        size: 4,
        checksum: Checksum::compute(&payload),
        payload,
        is_final: false,
    };
    let err = engine
        .sequencer
        .accept_chunk(session.session_id, lying)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidChunkSize { .. }));
}

#[tokio::test]
async fn test_checksum_mismatch_rejected() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    let bad = IncomingChunk {
        chunk_index: 0,
        size: 5,
        checksum: Checksum::compute(b"something else"),
        payload: Bytes::from_static(&[0u8; 5]),
        is_final: false,
    };
    let err = engine
        .sequencer
        .accept_chunk(session.session_id, bad)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ChecksumMismatch { .. }));

    // Nothing committed, so resending the same index succeeds.
    let ok = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 5], false))
        .await
        .unwrap();
    assert_eq!(ok.uploaded_chunks, 1);
}

#[tokio::test]
async fn test_accept_after_completed_is_closed() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(5, 5).await;
    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 5], false))
        .await
        .unwrap();

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(1, &[0u8; 5], true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::SessionClosed {
            status: SessionStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_accept_after_cancel_is_closed() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;
    engine.lifecycle.cancel(session.session_id).await.unwrap();

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 5], false))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionClosed { .. }));
}

#[tokio::test]
async fn test_expired_session_cancelled_on_accept() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(10, 5).await;

    // Force the deadline into the past directly in the store.
    let mut row = engine
        .store
        .get_session(*session.session_id.as_uuid())
        .await
        .unwrap()
        .unwrap();
    row.expires_at = OffsetDateTime::now_utc() - time::Duration::hours(1);
    engine
        .store
        .delete_session(*session.session_id.as_uuid())
        .await
        .unwrap();
    engine.store.create_session(&row).await.unwrap();

    let err = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 5], false))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionExpired(_)));

    let after = engine.lifecycle.get(session.session_id).await.unwrap();
    assert_eq!(after.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_session_not_found() {
    let engine = TestEngine::new().await;
    let err = engine
        .sequencer
        .accept_chunk(ferry_core::SessionId::new(), chunk(0, &[0u8; 5], false))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_progress_notified_on_success_and_closure() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(5, 5).await;
    engine
        .sequencer
        .accept_chunk(session.session_id, chunk(0, &[0u8; 5], false))
        .await
        .unwrap();
    // Closed attempt also notifies so observers see the terminal state.
    let _ = engine
        .sequencer
        .accept_chunk(session.session_id, chunk(1, &[0u8; 5], false))
        .await;

    let events = engine.notifier.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1.status, SessionStatus::Completed);
    assert_eq!(events[0].1.progress_percentage, 100);
    assert_eq!(events[1].1.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_counters_monotonic_across_sequence() {
    let engine = TestEngine::new().await;
    let session = engine.initiate(20, 5).await;

    let mut last_bytes = 0;
    let mut last_chunks = 0;
    for i in 0..4u64 {
        let snapshot = engine
            .sequencer
            .accept_chunk(session.session_id, chunk(i, &[i as u8; 5], false))
            .await
            .unwrap();
        assert!(snapshot.uploaded_bytes >= last_bytes);
        assert!(snapshot.uploaded_chunks >= last_chunks);
        assert!(snapshot.uploaded_bytes <= snapshot.total_size);
        assert!(snapshot.uploaded_chunks <= snapshot.total_chunks);
        last_bytes = snapshot.uploaded_bytes;
        last_chunks = snapshot.uploaded_chunks;
    }
    assert_eq!(last_bytes, 20);
}
