use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;

use super::gateway_error;
use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub backend: String,
    pub bytes_written: u64,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub ids: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Stream an object's content from the backend it is routed to.
/// Route: GET /object/:id
pub async fn read_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.gateway.read(&id).await.map_err(gateway_error)?;
    tracing::debug!(object_id = %id, backend = %outcome.backend, "Serving object");

    let mut response = (StatusCode::OK, Body::from_stream(outcome.body.stream)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(length) = outcome.body.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// Stream the request body to the backend the id is routed to.
/// Route: PUT /object/:id
pub async fn write_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<JSend<WriteResponse>>, ApiError> {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ApiError::length_required("Content-Length header is required"))?;

    if content_length > state.config.max_upload_size {
        return Err(ApiError::payload_too_large(format!(
            "Object exceeds maximum upload size of {} bytes",
            state.config.max_upload_size
        )));
    }

    let stream = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();

    let outcome = state
        .gateway
        .write(&id, stream, content_length)
        .await
        .map_err(gateway_error)?;

    tracing::debug!(
        object_id = %id,
        backend = %outcome.backend,
        bytes = outcome.bytes_written,
        "Stored object"
    );

    Ok(JSend::success(WriteResponse {
        backend: outcome.backend,
        bytes_written: outcome.bytes_written,
        id,
    }))
}

/// Route: GET /objects
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<ListResponse>>, ApiError> {
    let ids = state.gateway.list().await.map_err(gateway_error)?;
    Ok(JSend::success(ListResponse { ids }))
}
