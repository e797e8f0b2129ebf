use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub id: String,
    pub index: usize,
    pub listable: bool,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<BackendInfo>,
    pub generation: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn backends(State(state): State<Arc<AppState>>) -> Json<JSend<BackendsResponse>> {
    let snapshot = state.gateway.registry().snapshot().await;
    let backends = snapshot
        .iter()
        .enumerate()
        .map(|(index, backend)| BackendInfo {
            id: backend.descriptor.id.clone(),
            index,
            listable: backend.descriptor.listable,
            name: backend.name().to_string(),
        })
        .collect();

    JSend::success(BackendsResponse {
        backends,
        generation: snapshot.generation(),
    })
}
