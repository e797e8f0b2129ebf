use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::sync::RwLock;

use super::{ByteStream, Connector, ObjectBody, ObjectStore, ObjectStoreError};
use crate::registry::BackendDescriptor;

/// Upper bound on the buffer reserved up front; larger bodies grow it as they arrive.
const INITIAL_CAPACITY: u64 = 64 * 1024;

/// In-memory object store for tests and local development.
pub struct MemoryStore {
    name: String,
    objects: RwLock<HashMap<String, Bytes>>,
    fail_container: bool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
            fail_container: false,
            unavailable: AtomicBool::new(false),
        }
    }

    /// A store whose container can never be created.
    pub fn with_failing_container(name: impl Into<String>) -> Self {
        Self {
            fail_container: true,
            ..Self::new(name)
        }
    }

    /// Make every subsequent get/put/list fail as if the backend went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    fn check_available(&self) -> Result<(), ObjectStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend(format!(
                "{} is unreachable",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_container(&self) -> Result<(), ObjectStoreError> {
        if self.fail_container {
            return Err(ObjectStoreError::Backend(format!(
                "cannot create container on {}",
                self.name
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, ObjectStoreError> {
        self.check_available()?;
        let data = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        Ok(ObjectBody::from_bytes(data))
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<u64, ObjectStoreError> {
        self.check_available()?;
        let mut buf = BytesMut::with_capacity(content_length.min(INITIAL_CAPACITY) as usize);
        let mut body = body;
        while let Some(chunk) = body.try_next().await? {
            buf.extend_from_slice(&chunk);
        }

        if buf.len() as u64 != content_length {
            return Err(ObjectStoreError::Backend(format!(
                "declared {content_length} bytes but received {}",
                buf.len()
            )));
        }

        self.objects
            .write()
            .await
            .insert(key.to_string(), buf.freeze());
        Ok(content_length)
    }

    async fn list_keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        self.check_available()?;
        Ok(self.objects.read().await.keys().cloned().collect())
    }
}

/// Builds [`MemoryStore`]s from descriptors. A store is created once per descriptor id and
/// handed out again on later discovery cycles, so contents survive a registry rebuild.
#[derive(Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    failing_containers: HashSet<String>,
    unconstructible: HashSet<String>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors with this id connect fine but fail container setup.
    pub fn failing_container(mut self, id: impl Into<String>) -> Self {
        self.failing_containers.insert(id.into());
        self
    }

    /// Descriptors with this id cannot be turned into a client at all.
    pub fn unconstructible(mut self, id: impl Into<String>) -> Self {
        self.unconstructible.insert(id.into());
        self
    }

    /// The store built for a descriptor id, if one was built.
    pub fn store(&self, id: &str) -> Option<Arc<MemoryStore>> {
        self.stores.lock().ok()?.get(id).cloned()
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        if self.unconstructible.contains(&descriptor.id) {
            return Err(ObjectStoreError::Backend(format!(
                "cannot configure client for {}",
                descriptor.address
            )));
        }

        let mut stores = self
            .stores
            .lock()
            .map_err(|_| ObjectStoreError::Backend("memory connector poisoned".to_string()))?;
        let store = stores
            .entry(descriptor.id.clone())
            .or_insert_with(|| {
                if self.failing_containers.contains(&descriptor.id) {
                    Arc::new(MemoryStore::with_failing_container(&descriptor.address))
                } else {
                    Arc::new(MemoryStore::new(&descriptor.address))
                }
            })
            .clone();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::stream_from_bytes;

    #[tokio::test]
    async fn test_put_rejects_short_body() {
        let store = MemoryStore::new("mem");
        let result = store.put("k", stream_from_bytes("abc"), 10).await;
        assert!(matches!(result, Err(ObjectStoreError::Backend(_))));
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn test_put_with_oversized_declared_length_fails_cleanly() {
        let store = MemoryStore::new("mem");
        let result = store.put("k", stream_from_bytes("abc"), u64::MAX).await;
        assert!(matches!(result, Err(ObjectStoreError::Backend(_))));
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let store = MemoryStore::new("mem");
        store.put("k", stream_from_bytes("abc"), 3).await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            store.get("k").await,
            Err(ObjectStoreError::Backend(_))
        ));

        store.set_unavailable(false);
        let body = store.get("k").await.unwrap();
        assert_eq!(body.collect().await.unwrap(), Bytes::from("abc"));
    }

    #[test]
    fn test_connector_reuses_store_per_id() {
        let connector = MemoryConnector::new();
        let descriptor = BackendDescriptor::new("a", "10.0.0.1:9000", "ak", "sk", false);

        let first = connector.connect(&descriptor).unwrap();
        let second = connector.connect(&descriptor).unwrap();
        assert_eq!(first.name(), second.name());
        assert!(connector.store("a").is_some());
        assert!(connector.store("b").is_none());
    }
}
