//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Upload engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum chunk size a client may declare, in bytes.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: u64,
    /// Maximum chunk size a client may declare, in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Maximum total upload size, in bytes.
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
    /// Internal chunk boundary for the streaming ingestion path, in bytes.
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: u64,
    /// Upload session time-to-live in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum sessions cancelled per sweep batch query.
    #[serde(default = "default_sweep_batch_limit")]
    pub sweep_batch_limit: u32,
}

fn default_min_chunk_size() -> u64 {
    crate::MIN_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_max_total_size() -> u64 {
    crate::MAX_TOTAL_SIZE
}

fn default_stream_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_sweep_batch_limit() -> u32 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_total_size: default_max_total_size(),
            stream_chunk_size: default_stream_chunk_size(),
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_limit: default_sweep_batch_limit(),
        }
    }
}

impl EngineConfig {
    /// Get the session time-to-live as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate bounds that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chunk_size == 0 {
            return Err("min_chunk_size must be at least 1".to_string());
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(format!(
                "min_chunk_size {} exceeds max_chunk_size {}",
                self.min_chunk_size, self.max_chunk_size
            ));
        }
        if self.stream_chunk_size == 0 {
            return Err("stream_chunk_size must be at least 1".to_string());
        }
        if self.max_total_size > i64::MAX as u64 {
            return Err(format!(
                "max_total_size {} exceeds i64::MAX and cannot be stored",
                self.max_total_size
            ));
        }
        if self.sweep_batch_limit == 0 {
            return Err("sweep_batch_limit must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite metadata store.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Optional query timeout in seconds.
        query_timeout_secs: Option<u64>,
    },
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in a temporary directory.
    ///
    /// **For testing only.** Uses small chunk bounds so tests do not need
    /// megabyte payloads.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig::default(),
            engine: EngineConfig {
                min_chunk_size: 1,
                stream_chunk_size: 64,
                ..EngineConfig::default()
            },
            storage: StorageConfig::Filesystem {
                path: root.join("storage"),
            },
            metadata: MetadataConfig::Sqlite {
                path: root.join("metadata.db"),
                query_timeout_secs: None,
            },
        }
    }
}
