//! Object storage abstraction for ferry.
//!
//! The upload engine only needs a small collaborator surface: put, get,
//! streamed get, delete, existence checks, and prefix listing. Backends live
//! under [`backends`]; the filesystem backend is the default.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, PutResult};

use ferry_core::config::StorageConfig;
use std::sync::Arc;

/// Build an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => Ok(Arc::new(FilesystemBackend::new(path).await?)),
    }
}
