//! Shared test harness for API tests.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use ferry_core::config::AppConfig;
use ferry_core::Checksum;
use ferry_engine::LogNotifier;
use ferry_server::{create_router, metrics, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Fully wired server over a temp directory, driven through `oneshot`.
pub struct TestServer {
    pub _temp: TempDir,
    pub state: AppState,
    router: Router,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a server with the test configuration adjusted first.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        metrics::register_metrics();
        let temp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::for_testing(temp.path());
        adjust(&mut config);
        let storage = ferry_storage::from_config(&config.storage).await.unwrap();
        let metadata = ferry_metadata::from_config(&config.metadata).await.unwrap();
        let state = AppState::new(config, storage, metadata, Arc::new(LogNotifier));
        let router = create_router(state.clone());
        Self {
            _temp: temp,
            state,
            router,
        }
    }

    /// Send a request with an optional identity header and JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-ferry-user", user);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Send a request with a raw byte body (the streaming path).
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        user: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-ferry-user", user)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Create a session and return its snapshot.
    pub async fn initiate(&self, user: &str, total_size: u64, chunk_size: u64) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/v1/uploads",
                Some(user),
                Some(json!({
                    "file_name": "data.bin",
                    "mime_type": "application/octet-stream",
                    "total_size": total_size.to_string(),
                    "chunk_size": chunk_size.to_string(),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "initiate failed: {body}");
        body
    }

    /// Upload one well-formed chunk.
    pub async fn upload_chunk(
        &self,
        user: &str,
        session_id: &str,
        index: u64,
        payload: &[u8],
        is_final: bool,
    ) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/v1/uploads/{session_id}/chunks"),
            Some(user),
            Some(chunk_body(index, payload, is_final)),
        )
        .await
    }
}

/// Build a chunk request body with a correct checksum.
pub fn chunk_body(index: u64, payload: &[u8], is_final: bool) -> Value {
    json!({
        "chunk_index": index,
        "chunk_size": payload.len().to_string(),
        "checksum": Checksum::compute(payload).to_hex(),
        "chunk_data": base64::engine::general_purpose::STANDARD.encode(payload),
        "is_final_chunk": is_final,
    })
}
