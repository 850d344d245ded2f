use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Inventory routes
        .route("/api/devices", get(handlers::devices::list_devices))
        .route("/api/devices/:name", get(handlers::devices::get_device))
        // Customer routes
        .route("/api/customers", get(handlers::customers::list_customers))
        .route("/api/customers/validate", post(handlers::customers::validate_customer))
        .route(
            "/api/customers/:name",
            get(handlers::customers::get_customer).delete(handlers::customers::delete_customer),
        )
        .route("/api/customers/:name/activate", post(handlers::customers::activate_customer))
        .route("/api/customers/:name/deactivate", post(handlers::customers::deactivate_customer))
        .route(
            "/api/customers/:name/error",
            get(handlers::customers::get_error).delete(handlers::customers::clear_error),
        )
        // Audit routes
        .route("/api/audit", get(handlers::audit::list_audit))
        .route("/api/audit/diff", get(handlers::audit::diff_audit))
        .route("/api/audit/:deployment_id", get(handlers::audit::get_deployment))
        .route("/api/audit/:deployment_id/previous", get(handlers::audit::previous_deployment))
        // WebSocket route
        .route("/ws", get(crate::ws::ws_handler))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
