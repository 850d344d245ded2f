pub mod audit;
pub mod customers;
pub mod devices;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ProvisionError;
use crate::AppState;

/// Error response body: {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Map a latched error code, falling back to 500 for anything unexpected
    pub fn from_code(code: u16, msg: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::with_status(status, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed not-found errors map to 404
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::with_status(StatusCode::NOT_FOUND, nf.to_string());
        }
        tracing::error!("Storage failure: {:#}", err);
        Self::internal(format!("{:#}", err))
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Transport { .. } => Self::bad_gateway(err.to_string()),
            ProvisionError::Storage(e) => e.into(),
        }
    }
}

/// Message response for simple status messages
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { message: msg.into() })
    }
}

/// Healthcheck endpoint, returns 200 OK with status
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "circuit-provisioner",
        "backend": state.lifecycle.registry().backend().kind(),
        "templates_dir": state.config.templates_dir,
        "devices": state.lifecycle.registry().devices().len(),
        "ws_clients": state.hub.client_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
