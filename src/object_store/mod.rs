mod memory;
mod s3;

pub use memory::{MemoryConnector, MemoryStore};
pub use s3::{S3Connector, S3Options, S3Store};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;

use crate::registry::BackendDescriptor;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Backend call timed out")]
    Timeout,
}

/// A stream of object content chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Object content as returned by a backend, positioned at the first byte.
pub struct ObjectBody {
    pub stream: ByteStream,
    /// Length reported by the backend, if it reported one.
    pub content_length: Option<u64>,
}

impl ObjectBody {
    pub fn from_bytes(data: Bytes) -> Self {
        let content_length = Some(data.len() as u64);
        Self {
            stream: futures::stream::once(async move { Ok(data) }).boxed(),
            content_length,
        }
    }

    /// Drain the stream into memory. Only used where the caller needs the whole object.
    pub async fn collect(self) -> Result<Bytes, std::io::Error> {
        let chunks: Vec<Bytes> = self.stream.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Wrap an in-memory buffer as a [`ByteStream`].
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    futures::stream::once(async move { Ok(data) }).boxed()
}

/// Client for one storage backend.
/// Keys are the gateway's object identifiers, stored as-is in the backend's container.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable backend name, for diagnostics only.
    fn name(&self) -> &str;
    /// Create the container if it does not exist yet.
    async fn ensure_container(&self) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<ObjectBody, ObjectStoreError>;
    /// Store exactly `content_length` bytes from `body`, returning the number of bytes stored.
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<u64, ObjectStoreError>;
    async fn list_keys(&self) -> Result<Vec<String>, ObjectStoreError>;
}

/// Turns a discovered backend descriptor into a ready-to-use client.
pub trait Connector: Send + Sync {
    fn connect(&self, descriptor: &BackendDescriptor)
        -> Result<Arc<dyn ObjectStore>, ObjectStoreError>;
}
