//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store abstraction used by the upload engine.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically. Returns the object's etag.
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>)
    -> StorageResult<PutResult>;

    /// Put an object from a byte stream atomically, without buffering the
    /// whole object in memory. Returns the object's etag.
    async fn put_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<PutResult>;

    /// Delete an object. Deleting an absent object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys with a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so misconfiguration surfaces before the
    /// first upload. The default is a no-op, suitable for local backends.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Result of a put operation.
#[derive(Clone, Debug)]
pub struct PutResult {
    /// Content-derived entity tag.
    pub etag: String,
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}
