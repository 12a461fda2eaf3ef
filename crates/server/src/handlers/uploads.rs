//! Upload session endpoints.

use crate::error::{ApiError, ApiResult};
use crate::identity::CallerIdentity;
use crate::metrics;
use crate::state::AppState;
use crate::wire::{ChunkRequest, InitiateRequest, ResumeView, SessionView, StatsView};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use base64::Engine as _;
use bytes::Bytes;
use ferry_core::{Checksum, InitiateUpload, SessionId, SessionStatus, UploadSession};
use ferry_engine::IncomingChunk;
use futures::StreamExt;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::instrument;

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Fetch a session the caller owns.
///
/// Sessions of other owners read as not-found so the namespace leaks nothing.
async fn fetch_owned(
    state: &AppState,
    session_id: SessionId,
    caller: &CallerIdentity,
) -> ApiResult<UploadSession> {
    let session = state.lifecycle.get(session_id).await?;
    if session.owner_id != caller.0 {
        return Err(ApiError::NotFound(format!(
            "session not found: {session_id}"
        )));
    }
    Ok(session)
}

/// `POST /v1/uploads` — create an upload session.
#[instrument(skip(state, request), fields(owner = %caller.0, file_name = %request.file_name))]
pub async fn initiate(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<InitiateRequest>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let checksum = request
        .checksum
        .as_deref()
        .map(Checksum::from_hex)
        .transpose()?;
    let session = state
        .lifecycle
        .initiate(InitiateUpload {
            file_name: request.file_name,
            mime_type: request.mime_type,
            total_size: request.total_size,
            chunk_size: request
                .chunk_size
                .unwrap_or(ferry_core::DEFAULT_CHUNK_SIZE),
            checksum,
            owner_id: caller.0,
            chatroom_id: request.chatroom_id,
            thread_id: request.thread_id,
        })
        .await?;

    metrics::UPLOAD_SESSIONS_CREATED.inc();
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// `GET /v1/uploads/{session_id}` — session snapshot.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session_id = parse_session_id(&session_id)?;
    let session = fetch_owned(&state, session_id, &caller).await?;
    Ok(Json(session.into()))
}

/// `DELETE /v1/uploads/{session_id}` — cancel a session.
#[instrument(skip(state), fields(owner = %caller.0))]
pub async fn cancel(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session_id = parse_session_id(&session_id)?;
    let before = fetch_owned(&state, session_id, &caller).await?;
    let cancelled = state.lifecycle.cancel(session_id).await?;
    if before.status != SessionStatus::Cancelled {
        metrics::UPLOAD_SESSIONS_CANCELLED.inc();
    }
    Ok(Json(cancelled.into()))
}

/// `POST /v1/uploads/{session_id}/chunks` — upload one chunk.
#[instrument(skip(state, request), fields(owner = %caller.0, chunk_index = request.chunk_index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
    Json(request): Json<ChunkRequest>,
) -> ApiResult<Json<SessionView>> {
    let session_id = parse_session_id(&session_id)?;
    fetch_owned(&state, session_id, &caller).await?;

    let payload: Bytes = base64::engine::general_purpose::STANDARD
        .decode(&request.chunk_data)
        .map_err(|e| ApiError::BadRequest(format!("chunk_data is not valid base64: {e}")))?
        .into();
    let checksum = Checksum::from_hex(&request.checksum)?;

    let started = Instant::now();
    let session = state
        .sequencer
        .accept_chunk(
            session_id,
            IncomingChunk {
                chunk_index: request.chunk_index,
                size: request.chunk_size,
                checksum,
                payload,
                is_final: request.is_final_chunk,
            },
        )
        .await?;
    metrics::CHUNK_ACCEPT_DURATION.observe(started.elapsed().as_secs_f64());
    metrics::CHUNKS_ACCEPTED.inc();
    metrics::BYTES_ACCEPTED.inc_by(request.chunk_size);
    if session.status == SessionStatus::Completed {
        metrics::UPLOAD_SESSIONS_COMPLETED.inc();
    }

    Ok(Json(session.into()))
}

/// `POST /v1/uploads/{session_id}/stream` — ingest the whole upload as one
/// continuous byte stream and assemble the final object.
#[instrument(skip(state, body), fields(owner = %caller.0))]
pub async fn stream(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
    body: Body,
) -> ApiResult<Json<SessionView>> {
    let session_id = parse_session_id(&session_id)?;
    let before = fetch_owned(&state, session_id, &caller).await?;

    let byte_stream = Box::pin(
        body.into_data_stream()
            .map(|piece| piece.map_err(std::io::Error::other)),
    );
    let session = state.assembler.ingest(session_id, byte_stream).await?;

    metrics::BYTES_ACCEPTED.inc_by(session.uploaded_bytes.saturating_sub(before.uploaded_bytes));
    if session.status == SessionStatus::Completed {
        metrics::UPLOAD_SESSIONS_COMPLETED.inc();
    }
    Ok(Json(session.into()))
}

/// `GET /v1/uploads/{session_id}/stats` — progress and throughput.
pub async fn stats(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<StatsView>> {
    let session_id = parse_session_id(&session_id)?;
    let session = fetch_owned(&state, session_id, &caller).await?;
    Ok(Json(StatsView::from_session(
        &session,
        OffsetDateTime::now_utc(),
    )))
}

/// `POST /v1/uploads/{session_id}/resume` — where a disconnected streaming
/// client should restart.
pub async fn resume(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ResumeView>> {
    let session_id = parse_session_id(&session_id)?;
    fetch_owned(&state, session_id, &caller).await?;
    let position = state.assembler.resume_position(session_id).await?;
    Ok(Json(position.into()))
}
