use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_device_row;

const SELECT_DEVICE: &str = r#"
    SELECT device_name, device_type, device_role, ip_address, loopback,
           customer_provisioning, forbidden_interfaces
    FROM devices
"#;

/// Device inventory database operations
pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<DeviceDescriptor>> {
        let rows = sqlx::query(&format!("{} ORDER BY device_name", SELECT_DEVICE))
            .fetch_all(pool)
            .await?;

        rows.iter().map(map_device_row).collect()
    }

    /// Insert or replace one inventory record
    pub async fn upsert(pool: &Pool<Sqlite>, device: &DeviceDescriptor) -> Result<()> {
        let forbidden = serde_json::to_string(&device.forbidden_interfaces)?;
        sqlx::query(
            r#"
            INSERT INTO devices (device_name, device_type, device_role, ip_address, loopback,
                                 customer_provisioning, forbidden_interfaces, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(device_name) DO UPDATE SET
                device_type = excluded.device_type,
                device_role = excluded.device_role,
                ip_address = excluded.ip_address,
                loopback = excluded.loopback,
                customer_provisioning = excluded.customer_provisioning,
                forbidden_interfaces = excluded.forbidden_interfaces,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&device.name)
        .bind(device.device_type.as_str())
        .bind(device.device_role.as_str())
        .bind(&device.mgmt_address)
        .bind(device.loopback_address.clone().unwrap_or_default())
        .bind(if device.customer_provisioning { 1i64 } else { 0i64 })
        .bind(&forbidden)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }
}
