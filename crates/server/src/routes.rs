//! Router assembly.

use crate::handlers::{health, uploads};
use crate::identity::require_identity;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    // Base64 plus JSON framing inflates chunk bodies by roughly a third;
    // doubling the chunk bound leaves comfortable headroom. The streaming
    // route carries whole uploads and is bounded by max_total_size instead.
    let chunk_body_limit = usize::try_from(state.config.engine.max_chunk_size)
        .unwrap_or(usize::MAX / 2)
        .saturating_mul(2);
    let stream_body_limit =
        usize::try_from(state.config.engine.max_total_size).unwrap_or(usize::MAX);

    let uploads = Router::new()
        .route("/v1/uploads", post(uploads::initiate))
        .route(
            "/v1/uploads/{session_id}",
            get(uploads::get_session).delete(uploads::cancel),
        )
        .route("/v1/uploads/{session_id}/chunks", post(uploads::upload_chunk))
        .route("/v1/uploads/{session_id}/stats", get(uploads::stats))
        .route("/v1/uploads/{session_id}/resume", post(uploads::resume))
        .layer(DefaultBodyLimit::max(chunk_body_limit))
        .merge(
            Router::new()
                .route("/v1/uploads/{session_id}/stream", post(uploads::stream))
                .layer(DefaultBodyLimit::max(stream_body_limit)),
        )
        .layer(middleware::from_fn(require_identity));

    let mut router = Router::new()
        .route("/v1/health", get(health::health))
        .merge(uploads);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
