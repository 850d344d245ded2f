use anyhow::{Context, Result};
use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Filter empty strings to None, used when DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a DeviceDescriptor
pub fn map_device_row(row: &SqliteRow) -> Result<DeviceDescriptor> {
    let forbidden_json: String = row.get("forbidden_interfaces");
    let provisioning: i64 = row.get("customer_provisioning");
    Ok(DeviceDescriptor {
        name: row.get("device_name"),
        device_type: row.get::<String, _>("device_type").parse()?,
        device_role: row.get::<String, _>("device_role").parse()?,
        mgmt_address: row.get("ip_address"),
        loopback_address: none_if_empty(row.get("loopback")),
        customer_provisioning: provisioning != 0,
        forbidden_interfaces: serde_json::from_str(&forbidden_json).unwrap_or_default(),
    })
}

/// Map a SQLite row to an ErrorLatch
pub fn map_latch_row(row: &SqliteRow) -> ErrorLatch {
    ErrorLatch {
        error_message: row.get("error_message"),
        error_code: row.get::<i64, _>("error_code") as u16,
        timestamp: row.get("timestamp"),
    }
}

/// Map a SQLite row to a DeployedConfig
pub fn map_deployed_config_row(row: &SqliteRow) -> DeployedConfig {
    let id: i64 = row.get("id");
    DeployedConfig {
        customer_name: row.get("customer_name"),
        device_name: row.get("device_name"),
        deployment_id: row.get("deployment_id"),
        path: super::deployed_config_path(id),
        content: row.get("config_content"),
    }
}

/// Decode the serialized AuditEntry stored in an audit_logs row
pub fn map_audit_row(row: &SqliteRow) -> Result<AuditEntry> {
    let id: i64 = row.get("id");
    let entry: String = row.get("entry");
    serde_json::from_str(&entry).with_context(|| format!("Malformed audit_logs row {}", id))
}
