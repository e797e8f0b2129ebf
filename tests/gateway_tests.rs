use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_gateway::gateway::{Gateway, GatewayError};
use object_gateway::object_store::{
    stream_from_bytes, ByteStream, Connector, MemoryConnector, MemoryStore, ObjectBody,
    ObjectStore, ObjectStoreError,
};
use object_gateway::registry::{BackendDescriptor, Registry};
use object_gateway::router;
use tokio::sync::Notify;

fn descriptor(id: &str) -> BackendDescriptor {
    BackendDescriptor::new(id, format!("{id}:9000"), "minio", "minio123", true)
}

async fn gateway_with(ids: &[&str]) -> (Gateway, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    let registry = Arc::new(Registry::new(connector.clone()));
    registry
        .initialize(ids.iter().map(|id| descriptor(id)).collect())
        .await;
    (Gateway::new(registry), connector)
}

async fn write(gateway: &Gateway, id: &str, content: &'static str) -> u64 {
    gateway
        .write(id, stream_from_bytes(content), content.len() as u64)
        .await
        .unwrap()
        .bytes_written
}

async fn read(gateway: &Gateway, id: &str) -> Bytes {
    gateway.read(id).await.unwrap().body.collect().await.unwrap()
}

#[tokio::test]
async fn test_read_missing_object() {
    let (gateway, _) = gateway_with(&["client1"]).await;

    let result = gateway.read("2").await;
    assert!(matches!(result, Err(GatewayError::ObjectNotFound(id)) if id == "2"));
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let (gateway, _) = gateway_with(&["client1"]).await;

    assert_eq!(write(&gateway, "3", "TESTING").await, 7);

    let outcome = gateway.read("3").await.unwrap();
    assert_eq!(outcome.backend, "client1:9000");
    assert_eq!(outcome.body.content_length, Some(7));
    assert_eq!(outcome.body.collect().await.unwrap(), Bytes::from("TESTING"));
}

#[tokio::test]
async fn test_multiple_backends_share_the_load() {
    let (gateway, connector) = gateway_with(&["client1", "client2"]).await;

    for (id, content) in [("1", "content1"), ("2", "content2"), ("3", "content3"), ("4", "content4")] {
        write(&gateway, id, content).await;
    }
    for (id, content) in [("1", "content1"), ("2", "content2"), ("3", "content3"), ("4", "content4")] {
        assert_eq!(read(&gateway, id).await, Bytes::from(content));
    }

    let size1 = connector.store("client1").unwrap().object_count().await;
    let size2 = connector.store("client2").unwrap().object_count().await;
    assert_eq!(size1 + size2, 4);
    assert_ne!(size1, 4);
    assert_ne!(size2, 0);
}

#[tokio::test]
async fn test_object_lands_on_routed_backend() {
    let ids = ["a", "b", "c"];
    let (gateway, connector) = gateway_with(&ids).await;

    write(&gateway, "photo-17", "x").await;

    let expected = ids[router::resolve("photo-17", ids.len())];
    assert!(connector.store(expected).unwrap().contains("photo-17").await);
    for other in ids.iter().filter(|id| **id != expected) {
        assert!(!connector.store(other).unwrap().contains("photo-17").await);
    }
}

#[tokio::test]
async fn test_no_backends_short_circuits() {
    let (gateway, _) = gateway_with(&[]).await;

    assert!(matches!(
        gateway.read("1").await,
        Err(GatewayError::NoBackendsAvailable)
    ));
    assert!(matches!(
        gateway.write("1", stream_from_bytes("x"), 1).await,
        Err(GatewayError::NoBackendsAvailable)
    ));
    assert!(matches!(
        gateway.list().await,
        Err(GatewayError::NoBackendsAvailable)
    ));
}

#[tokio::test]
async fn test_backend_failure_surfaces_as_backend_error() {
    let (gateway, connector) = gateway_with(&["client1"]).await;
    write(&gateway, "1", "content1").await;

    connector.store("client1").unwrap().set_unavailable(true);

    match gateway.read("1").await {
        Err(GatewayError::Backend { backend, .. }) => assert_eq!(backend, "client1:9000"),
        other => panic!("expected backend error, got {:?}", other.map(|o| o.backend)),
    }
    assert!(matches!(
        gateway.write("1", stream_from_bytes("x"), 1).await,
        Err(GatewayError::Backend { .. })
    ));
}

#[tokio::test]
async fn test_list_skips_non_listable_backends() {
    let connector = Arc::new(MemoryConnector::new());
    let registry = Arc::new(Registry::new(connector.clone()));
    registry
        .initialize(vec![
            BackendDescriptor::new("open", "open:9000", "ak", "sk", true),
            BackendDescriptor::new("closed", "closed:9000", "ak", "sk", false),
        ])
        .await;
    let gateway = Gateway::new(registry);

    for id in ["1", "2", "3", "4"] {
        write(&gateway, id, "data").await;
    }

    let listed = gateway.list().await.unwrap();
    let open_count = connector.store("open").unwrap().object_count().await;
    assert_eq!(listed.len(), open_count);
    assert!(listed.windows(2).all(|w| w[0] < w[1]));
}

/// Holds every put until released.
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Notify>,
    entered: Arc<Notify>,
}

#[async_trait]
impl ObjectStore for GatedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_container(&self) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, ObjectStoreError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<u64, ObjectStoreError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.put(key, body, content_length).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        self.inner.list_keys().await
    }
}

struct GatedConnector {
    store: Arc<GatedStore>,
    others: MemoryConnector,
}

impl Connector for GatedConnector {
    fn connect(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        if descriptor.id == "gated" {
            Ok(self.store.clone())
        } else {
            self.others.connect(descriptor)
        }
    }
}

#[tokio::test]
async fn test_in_flight_write_keeps_its_backend_across_rebuild() {
    let gate = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let store = Arc::new(GatedStore {
        inner: MemoryStore::new("gated:9000"),
        gate: gate.clone(),
        entered: entered.clone(),
    });
    let registry = Arc::new(Registry::new(Arc::new(GatedConnector {
        store: store.clone(),
        others: MemoryConnector::new(),
    })));
    registry.initialize(vec![descriptor("gated")]).await;
    let gateway = Gateway::new(Arc::clone(&registry));

    let writer = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.write("obj", stream_from_bytes("payload"), 7).await })
    };
    entered.notified().await;

    // The registry changes underneath the in-flight request.
    registry
        .initialize(vec![descriptor("x"), descriptor("y"), descriptor("z")])
        .await;
    gate.notify_one();

    let outcome = writer.await.unwrap().unwrap();
    assert_eq!(outcome.backend, "gated:9000");
    assert_eq!(outcome.bytes_written, 7);
    assert!(store.inner.contains("obj").await);
}

#[tokio::test]
async fn test_routing_against_snapshots_during_rebuilds() {
    let connector = Arc::new(MemoryConnector::new());
    let registry = Arc::new(Registry::new(connector));
    registry.initialize(vec![descriptor("a"), descriptor("b")]).await;

    let rebuilder = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for round in 0..50 {
                let count = 1 + round % 4;
                let ids: Vec<_> = (0..count).map(|i| descriptor(&format!("n{i}"))).collect();
                registry.initialize(ids).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..8)
        .map(|reader| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..200 {
                    let id = format!("{reader}-{i}");
                    let snapshot = registry.snapshot().await;
                    let (index, backend) = snapshot.route(&id).unwrap();
                    assert!(index < snapshot.len());
                    assert_eq!(index, router::resolve(&id, snapshot.len()));
                    assert_eq!(snapshot.at(index).name(), backend.name());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    rebuilder.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

/// A backend whose bucket has disappeared: every call reports it missing.
struct BucketGoneStore;

#[async_trait]
impl ObjectStore for BucketGoneStore {
    fn name(&self) -> &str {
        "gone:9000"
    }

    async fn ensure_container(&self) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, ObjectStoreError> {
        Err(ObjectStoreError::NotFound(key.to_string()))
    }

    async fn put(
        &self,
        _key: &str,
        _body: ByteStream,
        _content_length: u64,
    ) -> Result<u64, ObjectStoreError> {
        Err(ObjectStoreError::NotFound("files".to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<String>, ObjectStoreError> {
        Ok(Vec::new())
    }
}

struct BucketGoneConnector;

impl Connector for BucketGoneConnector {
    fn connect(
        &self,
        _descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        Ok(Arc::new(BucketGoneStore))
    }
}

#[tokio::test]
async fn test_write_not_found_is_a_backend_error() {
    let registry = Arc::new(Registry::new(Arc::new(BucketGoneConnector)));
    registry.initialize(vec![descriptor("gone")]).await;
    let gateway = Gateway::new(registry);

    match gateway.write("1", stream_from_bytes("x"), 1).await {
        Err(GatewayError::Backend { backend, source }) => {
            assert_eq!(backend, "gone:9000");
            assert!(matches!(source, ObjectStoreError::NotFound(_)));
        }
        other => panic!("expected backend error, got {other:?}"),
    }

    // Reads still treat a miss as a missing object.
    assert!(matches!(
        gateway.read("1").await,
        Err(GatewayError::ObjectNotFound(id)) if id == "1"
    ));
}
