mod admin;
mod objects;

use crate::api::response::ApiError;
use crate::gateway::GatewayError;

pub use admin::{backends, health};
pub use objects::{list_objects, read_object, write_object};

/// Map a GatewayError to an ApiError
fn gateway_error(e: GatewayError) -> ApiError {
    match e {
        GatewayError::NoBackendsAvailable => {
            ApiError::unavailable("No storage backends available, retry shortly")
        }
        GatewayError::ObjectNotFound(id) => ApiError::not_found(format!("Object '{id}' not found")),
        GatewayError::Backend { .. } => ApiError::bad_gateway(e.to_string()),
    }
}
