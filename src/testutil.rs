//! Shared test helpers for object-gateway unit tests.

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::object_store::MemoryConnector;
use crate::registry::{BackendDescriptor, Registry};
use crate::AppState;

/// Create a test AppState whose registry has been initialized from `descriptors`
/// with in-memory backends. The connector is returned for inspecting the stores.
pub async fn test_state(
    connector: MemoryConnector,
    descriptors: Vec<BackendDescriptor>,
) -> (Arc<AppState>, Arc<MemoryConnector>) {
    let config = Config {
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        ..Config::default()
    };

    let connector = Arc::new(connector);
    let registry = Arc::new(Registry::new(connector.clone()));
    registry.initialize(descriptors).await;

    let state = Arc::new(AppState {
        config,
        gateway: Gateway::new(registry),
    });
    (state, connector)
}
