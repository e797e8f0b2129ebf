//! The set of live backends requests are routed across.
//!
//! The registry holds an immutable [`BackendSet`] behind a shared pointer. A discovery
//! cycle builds a complete new set and swaps the pointer in one step; request handling
//! clones the pointer once and routes against that snapshot for the rest of the request.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::object_store::{Connector, ObjectStore};
use crate::router;

/// Identity of one discovered backend. Immutable once discovered.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Opaque id assigned by the discovery source (container id, manifest key, address).
    pub id: String,
    /// `host:port` of the backend's S3 endpoint.
    pub address: String,
    pub access_key: String,
    pub secret_key: String,
    pub listable: bool,
}

impl BackendDescriptor {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        listable: bool,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            listable,
        }
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("listable", &self.listable)
            .finish()
    }
}

/// A usable backend: its descriptor plus an initialized client.
pub struct Backend {
    pub descriptor: BackendDescriptor,
    pub store: Arc<dyn ObjectStore>,
}

impl Backend {
    pub fn name(&self) -> &str {
        self.store.name()
    }
}

/// One immutable generation of the registry. Order is discovery order and is the
/// basis of routing.
pub struct BackendSet {
    generation: u64,
    backends: Vec<Backend>,
}

impl BackendSet {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            backends: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn at(&self, index: usize) -> &Backend {
        &self.backends[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }

    /// The backend responsible for `id`, or `None` when the set is empty.
    /// The emptiness check happens before any hashing.
    pub fn route(&self, id: &str) -> Option<(usize, &Backend)> {
        if self.backends.is_empty() {
            return None;
        }
        let index = router::resolve(id, self.backends.len());
        Some((index, self.at(index)))
    }
}

/// A descriptor that could not be turned into a usable backend during a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFailure {
    pub id: String,
    pub address: String,
    pub reason: String,
}

/// Result of one rebuild: the published snapshot and every descriptor left out of it.
pub struct RegistryUpdate {
    pub snapshot: Arc<BackendSet>,
    pub failures: Vec<DescriptorFailure>,
}

pub struct Registry {
    connector: Arc<dyn Connector>,
    current: RwLock<Arc<BackendSet>>,
}

impl Registry {
    /// An empty registry whose backends will be built by `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            current: RwLock::new(Arc::new(BackendSet::empty())),
        }
    }

    /// The current snapshot. Holders keep seeing it even after a later rebuild.
    pub async fn snapshot(&self) -> Arc<BackendSet> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn count(&self) -> usize {
        self.current.read().await.len()
    }

    /// Build a client for every descriptor, ensure its container exists, and publish
    /// the successful ones as the new snapshot. Failing descriptors are dropped and
    /// reported; they never abort the rebuild.
    pub async fn initialize(&self, descriptors: Vec<BackendDescriptor>) -> RegistryUpdate {
        let attempts = descriptors
            .into_iter()
            .map(|descriptor| self.prepare(descriptor));
        let results = futures::future::join_all(attempts).await;

        let mut backends = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(backend) => backends.push(backend),
                Err(failure) => {
                    warn!(
                        backend_id = %failure.id,
                        address = %failure.address,
                        reason = %failure.reason,
                        "Dropping backend from registry"
                    );
                    failures.push(failure);
                }
            }
        }

        let snapshot = {
            let mut current = self.current.write().await;
            let next = Arc::new(BackendSet {
                generation: current.generation + 1,
                backends,
            });
            *current = Arc::clone(&next);
            next
        };

        info!(
            generation = snapshot.generation(),
            backends = snapshot.len(),
            failed = failures.len(),
            "Published backend registry"
        );

        RegistryUpdate { snapshot, failures }
    }

    async fn prepare(&self, descriptor: BackendDescriptor) -> Result<Backend, DescriptorFailure> {
        let fail = |reason: String| DescriptorFailure {
            id: descriptor.id.clone(),
            address: descriptor.address.clone(),
            reason,
        };

        let store = self
            .connector
            .connect(&descriptor)
            .map_err(|e| fail(format!("cannot configure client: {e}")))?;
        store
            .ensure_container()
            .await
            .map_err(|e| fail(format!("cannot create/check container: {e}")))?;

        Ok(Backend { descriptor, store })
    }
}
