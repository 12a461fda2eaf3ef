//! Core domain types and shared logic for the ferry upload engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session identifiers and lifecycle states
//! - Chunk receipts and checksums
//! - Overflow-checked byte arithmetic and progress computation
//! - Configuration types

pub mod checksum;
pub mod config;
pub mod error;
pub mod session;
pub mod size;

pub use checksum::{Checksum, ChecksumHasher};
pub use error::{Error, Result};
pub use session::{ChunkReceipt, InitiateUpload, SessionId, SessionStatus, UploadSession};

/// Default internal chunk size for the streaming ingestion path: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum chunk size a client may declare: 1 MiB.
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum chunk size a client may declare: 100 MiB.
pub const MAX_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum total upload size: 100 GiB.
pub const MAX_TOTAL_SIZE: u64 = 100 * 1024 * 1024 * 1024;
