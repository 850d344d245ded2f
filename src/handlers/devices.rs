use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::models::DeviceDescriptor;
use crate::AppState;

/// List all inventory devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceDescriptor>> {
    Json(state.lifecycle.registry().devices().into_iter().cloned().collect())
}

/// Get a single inventory device by name
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeviceDescriptor>, ApiError> {
    state
        .lifecycle
        .registry()
        .device(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Device"))
}
