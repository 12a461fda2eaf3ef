//! Prometheus metrics.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::core::Collector;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_upload_sessions_created_total",
        "Upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_upload_sessions_completed_total",
        "Upload sessions completed and assembled",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_CANCELLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_upload_sessions_cancelled_total",
        "Upload sessions cancelled by clients",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferry_upload_sessions_expired_total",
        "Upload sessions cancelled by the expiry sweep",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_ACCEPTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ferry_chunks_accepted_total", "Chunks accepted and committed")
        .expect("metric creation failed")
});

pub static BYTES_ACCEPTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("ferry_bytes_accepted_total", "Payload bytes accepted")
        .expect("metric creation failed")
});

pub static CHUNK_ACCEPT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "ferry_chunk_accept_duration_seconds",
            "Time to validate, persist, and commit one chunk",
        )
        .buckets(vec![0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_upload_errors_total", "Rejected requests by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static ACTIVE_UPLOAD_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ferry_active_upload_sessions",
        "Sessions currently able to accept chunks",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(UPLOAD_SESSIONS_CREATED.clone()),
            Box::new(UPLOAD_SESSIONS_COMPLETED.clone()),
            Box::new(UPLOAD_SESSIONS_CANCELLED.clone()),
            Box::new(UPLOAD_SESSIONS_EXPIRED.clone()),
            Box::new(CHUNKS_ACCEPTED.clone()),
            Box::new(BYTES_ACCEPTED.clone()),
            Box::new(CHUNK_ACCEPT_DURATION.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
            Box::new(ACTIVE_UPLOAD_SESSIONS.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("collector registration failed");
        }
    });
}

/// Count one rejected request by its stable error code.
pub fn record_upload_error(code: &str) {
    UPLOAD_ERRORS.with_label_values(&[code]).inc();
}

/// Render the registry in the Prometheus text exposition format.
pub async fn metrics_handler() -> Response {
    let metric_families = REGISTRY.gather();
    let mut buffer = String::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode_utf8(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        )
            .into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        register_metrics();
        register_metrics();
        record_upload_error("out_of_sequence");
        let families = REGISTRY.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ferry_upload_errors_total"));
    }
}
