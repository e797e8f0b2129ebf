//! Read/write orchestration: one registry snapshot, one routing decision and one
//! backend call per request. Failures are reported once and never retried.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::object_store::{ByteStream, ObjectBody, ObjectStoreError};
use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No storage backends available")]
    NoBackendsAvailable,
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("Backend {backend} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: ObjectStoreError,
    },
}

impl GatewayError {
    /// Only a read can miss; a missing object is not a backend failure there.
    fn from_read(backend: &str, id: &str, err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) => GatewayError::ObjectNotFound(id.to_string()),
            source => Self::backend(backend, id, source),
        }
    }

    fn backend(backend: &str, id: &str, source: ObjectStoreError) -> Self {
        warn!(backend = %backend, object_id = %id, error = %source, "Backend call failed");
        GatewayError::Backend {
            backend: backend.to_string(),
            source,
        }
    }
}

pub struct ReadOutcome {
    /// Name of the backend that served the object.
    pub backend: String,
    pub body: ObjectBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub backend: String,
    pub bytes_written: u64,
}

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<Registry>,
}

impl Gateway {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn read(&self, id: &str) -> Result<ReadOutcome, GatewayError> {
        let snapshot = self.registry.snapshot().await;
        let (index, backend) = snapshot
            .route(id)
            .ok_or(GatewayError::NoBackendsAvailable)?;
        debug!(object_id = %id, index, backend = %backend.name(), "Routing read");

        let body = backend
            .store
            .get(id)
            .await
            .map_err(|e| GatewayError::from_read(backend.name(), id, e))?;

        Ok(ReadOutcome {
            backend: backend.name().to_string(),
            body,
        })
    }

    /// Forward `body` to the responsible backend. `content_length` is passed through
    /// as given; the body is never buffered to check it.
    pub async fn write(
        &self,
        id: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<WriteOutcome, GatewayError> {
        let snapshot = self.registry.snapshot().await;
        let (index, backend) = snapshot
            .route(id)
            .ok_or(GatewayError::NoBackendsAvailable)?;
        debug!(object_id = %id, index, backend = %backend.name(), content_length, "Routing write");

        let bytes_written = backend
            .store
            .put(id, body, content_length)
            .await
            .map_err(|e| GatewayError::backend(backend.name(), id, e))?;

        Ok(WriteOutcome {
            backend: backend.name().to_string(),
            bytes_written,
        })
    }

    /// Every key held by the listable backends of the current snapshot, sorted.
    pub async fn list(&self) -> Result<Vec<String>, GatewayError> {
        let snapshot = self.registry.snapshot().await;
        if snapshot.is_empty() {
            return Err(GatewayError::NoBackendsAvailable);
        }

        let mut keys = Vec::new();
        for backend in snapshot.iter().filter(|b| b.descriptor.listable) {
            let listed = backend.store.list_keys().await.map_err(|source| {
                warn!(backend = %backend.name(), error = %source, "Listing failed");
                GatewayError::Backend {
                    backend: backend.name().to_string(),
                    source,
                }
            })?;
            keys.extend(listed);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
