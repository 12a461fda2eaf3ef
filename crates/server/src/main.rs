//! ferryd — chunked and streaming upload session server.

use anyhow::Context;
use clap::Parser;
use ferry_core::config::AppConfig;
use ferry_engine::LogNotifier;
use ferry_server::{create_router, metrics, AppState};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "ferryd", version, about = "Upload session server")]
struct Args {
    /// Path to a TOML configuration file. Environment variables prefixed
    /// with FERRY_ override file values (FERRY_SERVER__BIND, ...).
    #[arg(long, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut figment = Figment::new();
    if let Some(path) = &args.config {
        figment = figment.merge(Toml::file(path));
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("FERRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    metrics::register_metrics();

    let storage = ferry_storage::from_config(&config.storage)
        .await
        .context("failed to initialize object storage")?;
    storage
        .health_check()
        .await
        .context("object storage health check failed")?;
    info!(backend = storage.backend_name(), "object storage ready");

    let metadata = ferry_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    info!("metadata store ready");

    let state = AppState::new(config, storage, metadata, Arc::new(LogNotifier));
    spawn_expiry_sweep(&state);

    let bind = state.config.server.bind.clone();
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "ferryd listening");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}

/// Periodically cancel expired sessions and refresh the active-session gauge.
fn spawn_expiry_sweep(state: &AppState) {
    let reaper = Arc::clone(&state.reaper);
    let store = Arc::clone(&state.metadata);
    tokio::spawn(async move {
        let interval = reaper.sweep_interval();
        info!(interval_secs = interval.as_secs(), "expiry sweep scheduler started");
        loop {
            tokio::time::sleep(interval).await;
            match reaper.sweep().await {
                Ok(expired) => metrics::UPLOAD_SESSIONS_EXPIRED.inc_by(expired),
                Err(e) => error!(error = %e, "expiry sweep failed"),
            }
            match store.count_active_sessions().await {
                Ok(active) => {
                    metrics::ACTIVE_UPLOAD_SESSIONS.set(i64::try_from(active).unwrap_or(i64::MAX));
                }
                Err(e) => warn!(error = %e, "failed to count active sessions"),
            }
        }
    });
}
