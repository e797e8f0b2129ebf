use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Objects
        .route("/object/:id", get(handlers::read_object))
        .route("/object/:id", put(handlers::write_object))
        .route("/objects", get(handlers::list_objects))
        // Internal
        .route("/_internal/backends", get(handlers::backends))
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
