//! Chunked and streaming upload session engine.
//!
//! Components, leaf-first:
//! - [`locks::SessionLocks`] — per-session write serialization
//! - [`lifecycle::SessionLifecycleManager`] — initiate / get / cancel
//! - [`sequencer::ChunkSequencer`] — strict in-order chunk acceptance
//! - [`assembler::StreamingAssembler`] — continuous-stream ingestion and
//!   final-object assembly
//! - [`reaper::ExpiryReaper`] — periodic expiry sweep
//! - [`notifier::ProgressNotifier`] — progress event sink

pub mod assembler;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod notifier;
pub mod reaper;
pub mod sequencer;

pub use assembler::{ResumePosition, StreamingAssembler};
pub use error::{EngineError, EngineResult};
pub use lifecycle::SessionLifecycleManager;
pub use locks::SessionLocks;
pub use notifier::{LogNotifier, ProgressEvent, ProgressNotifier};
pub use reaper::ExpiryReaper;
pub use sequencer::{ChunkSequencer, IncomingChunk};
