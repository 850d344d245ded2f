use anyhow::Result;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_audit_row;

const SELECT_AUDIT: &str = "SELECT id, entry FROM audit_logs";

/// Audit entry time-series operations. Rows are append-only.
pub struct AuditLogRepo;

impl AuditLogRepo {
    pub async fn list(pool: &Pool<Sqlite>, customer: Option<&str>) -> Result<Vec<AuditEntry>> {
        let rows = match customer {
            Some(customer) => {
                sqlx::query(&format!("{} WHERE customer_name = ? ORDER BY id", SELECT_AUDIT))
                    .bind(customer)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY id", SELECT_AUDIT))
                    .fetch_all(pool)
                    .await?
            }
        };

        rows.iter().map(map_audit_row).collect()
    }

    pub async fn list_by_deployment(
        pool: &Pool<Sqlite>,
        deployment_id: &str,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!("{} WHERE deployment_id = ? ORDER BY id", SELECT_AUDIT))
            .bind(deployment_id)
            .fetch_all(pool)
            .await?;

        rows.iter().map(map_audit_row).collect()
    }

    pub async fn append(pool: &Pool<Sqlite>, entry: &AuditEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query(
            r#"
            INSERT INTO audit_logs (time, customer_name, deployment_id, operator, entry)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.timestamp)
        .bind(&entry.customer_name)
        .bind(&entry.deployment_id)
        .bind(&entry.operator)
        .bind(&data)
        .execute(pool)
        .await?;
        Ok(())
    }
}
