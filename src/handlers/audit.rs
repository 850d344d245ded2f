use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::models::*;
use crate::AppState;

#[derive(Deserialize)]
pub struct DiffQuery {
    pub from: String,
    pub to: String,
}

#[derive(Serialize)]
pub struct DiffResponse {
    pub from: String,
    pub to: String,
    pub diff: String,
}

#[derive(Deserialize)]
pub struct PreviousQuery {
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Serialize)]
pub struct PreviousResponse {
    pub deployment_id: String,
    pub previous: Option<String>,
}

/// List deployment runs, newest first
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditEntrySummary>>, ApiError> {
    Ok(Json(state.audit.list(&filter).await?))
}

/// Unified diff of deployed configuration between two runs
pub async fn diff_audit(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DiffQuery>,
) -> Result<Json<DiffResponse>, ApiError> {
    let diff = state.audit.diff_check(&q.from, &q.to).await?;
    Ok(Json(DiffResponse {
        from: q.from,
        to: q.to,
        diff,
    }))
}

/// All audit entries recorded under one deployment identifier
pub async fn get_deployment(
    State(state): State<Arc<AppState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let entries = state.audit.query(&deployment_id).await?;
    if entries.is_empty() {
        return Err(ApiError::not_found("Deployment"));
    }
    Ok(Json(entries))
}

/// The deployment of the same customer that preceded this one
pub async fn previous_deployment(
    State(state): State<Arc<AppState>>,
    Path(deployment_id): Path<String>,
    Query(q): Query<PreviousQuery>,
) -> Result<Json<PreviousResponse>, ApiError> {
    let customer = match q.customer {
        Some(c) => c,
        None => state
            .audit
            .query(&deployment_id)
            .await?
            .into_iter()
            .next()
            .map(|e| e.customer_name)
            .ok_or_else(|| ApiError::not_found("Deployment"))?,
    };
    let previous = state
        .audit
        .find_previous_deployment_id(&customer, &deployment_id)
        .await?;
    Ok(Json(PreviousResponse {
        deployment_id,
        previous,
    }))
}
