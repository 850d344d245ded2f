use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::{ApiError, MessageResponse};
use crate::lifecycle::LifecycleOutcome;
use crate::models::*;
use crate::registry::Deletion;
use crate::utils;
use crate::AppState;

/// Result of a successful activation or deactivation
#[derive(Serialize)]
pub struct DeploymentResponse {
    pub deployment_id: String,
    pub customer_name: String,
    pub entries: Vec<AuditEntry>,
}

/// Dry-run validation result listing every conflict
#[derive(Serialize)]
pub struct ValidationResponse {
    pub ok: bool,
    pub conflicts: Vec<String>,
}

/// List all customer allocations
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CustomerAllocation>>, ApiError> {
    Ok(Json(state.lifecycle.registry().customers().await?))
}

/// Get a single customer allocation
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CustomerAllocation>, ApiError> {
    check_path_name(&name)?;
    state
        .lifecycle
        .registry()
        .customer(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer"))
}

/// Logically remove a customer allocation
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    check_path_name(&name)?;
    match state.lifecycle.delete(&name).await? {
        Deletion::Deleted => Ok(StatusCode::NO_CONTENT),
        Deletion::NotFound => Err(ApiError::not_found("Customer")),
        Deletion::InProgress => Err(ApiError::conflict(format!(
            "A deployment for customer {} is in progress",
            name
        ))),
    }
}

/// Check a prospective allocation without reserving or deploying anything
pub async fn validate_customer(
    State(state): State<Arc<AppState>>,
    Json(candidate): Json<CustomerAllocation>,
) -> Result<Json<ValidationResponse>, ApiError> {
    check_names(&candidate)?;
    let mut conflicts = Vec::new();
    if let Err(msg) = candidate.check_ranges() {
        conflicts.push(msg);
    }
    conflicts.extend(state.lifecycle.registry().check(&candidate).await?);
    Ok(Json(ValidationResponse {
        ok: conflicts.is_empty(),
        conflicts,
    }))
}

/// Activate a customer service from the allocation in the request body
pub async fn activate_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    operator: Operator,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    check_path_name(&name)?;
    let candidate = allocation_from_body(&name, body)?;
    check_names(&candidate)?;
    let outcome = state.lifecycle.activate(candidate, &operator).await?;
    outcome_response(&name, outcome)
}

/// Push deactivation templates for a stored customer
pub async fn deactivate_customer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    operator: Operator,
) -> Result<Json<DeploymentResponse>, ApiError> {
    check_path_name(&name)?;
    let outcome = state.lifecycle.deactivate(&name, &operator).await?;
    outcome_response(&name, outcome)
}

/// Read the error latch blocking a customer, if any
pub async fn get_error(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ErrorLatch>, ApiError> {
    check_path_name(&name)?;
    state
        .lifecycle
        .error_latch(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Error latch"))
}

/// Clear the error latch so deployments may proceed again
pub async fn clear_error(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    check_path_name(&name)?;
    if state.lifecycle.clear_error(&name).await? {
        Ok(MessageResponse::new(format!("Error latch cleared for {}", name)))
    } else {
        Err(ApiError::not_found("Error latch"))
    }
}

fn outcome_response(name: &str, outcome: LifecycleOutcome) -> Result<Json<DeploymentResponse>, ApiError> {
    match outcome {
        LifecycleOutcome::Deployed(report) => Ok(Json(DeploymentResponse {
            deployment_id: report.deployment_id,
            customer_name: name.to_string(),
            entries: report.entries,
        })),
        LifecycleOutcome::Denied(auth) => Err(ApiError::forbidden(auth.message())),
        LifecycleOutcome::Conflict(msg) => Err(ApiError::conflict(msg)),
        LifecycleOutcome::GenerationFailed(latch) => {
            Err(ApiError::from_code(latch.error_code, latch.error_message))
        }
        LifecycleOutcome::DeploymentFailed(report) => {
            let msg = report
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "Deployment failed".to_string());
            Err(ApiError::bad_gateway(format!(
                "{} (deployment {}, {} device(s) already applied)",
                msg,
                report.deployment_id,
                report.entries.len()
            )))
        }
    }
}

/// Build the candidate from the request body; the path names the customer
fn allocation_from_body(name: &str, mut body: serde_json::Value) -> Result<CustomerAllocation, ApiError> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| ApiError::bad_request("Expected a JSON object"))?;
    if let Some(body_name) = obj.get("name").and_then(|v| v.as_str()) {
        if body_name != name {
            return Err(ApiError::bad_request(format!(
                "Body name {} does not match path name {}",
                body_name, name
            )));
        }
    }
    obj.insert("name".to_string(), serde_json::Value::String(name.to_string()));
    serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid customer allocation: {}", e)))
}

/// Customer names from the path end up in filenames too
fn check_path_name(name: &str) -> Result<(), ApiError> {
    if utils::is_valid_name(name) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid customer name: {}", name)))
    }
}

/// Names end up in artifact filenames
fn check_names(c: &CustomerAllocation) -> Result<(), ApiError> {
    for (what, value) in [
        ("customer name", &c.name),
        ("access device", &c.access_device_name),
        ("PE device", &c.pe_device_name),
    ] {
        if !utils::is_valid_name(value) {
            return Err(ApiError::bad_request(format!("Invalid {}: {}", what, value)));
        }
    }
    Ok(())
}
