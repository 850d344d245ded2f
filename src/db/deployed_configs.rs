use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_deployed_config_row;

const SELECT_DEPLOYED: &str = r#"
    SELECT id, customer_name, device_name, deployment_id, config_content
    FROM deployed_configs
"#;

/// Deployed artifact time-series operations
pub struct DeployedConfigRepo;

impl DeployedConfigRepo {
    /// Most recent artifact for a customer/device pair
    pub async fn latest(
        pool: &Pool<Sqlite>,
        customer: &str,
        device: &str,
    ) -> Result<Option<DeployedConfig>> {
        let row = sqlx::query(&format!(
            "{} WHERE customer_name = ? AND device_name = ? ORDER BY deployment_id DESC, id DESC LIMIT 1",
            SELECT_DEPLOYED
        ))
        .bind(customer)
        .bind(device)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_deployed_config_row))
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<DeployedConfig>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_DEPLOYED))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_deployed_config_row))
    }

    /// Record an artifact and return its row id
    pub async fn create(pool: &Pool<Sqlite>, config: &NewDeployedConfig<'_>) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO deployed_configs (time, customer_name, device_name, operator,
                                          deployment_id, config_content)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now())
        .bind(config.customer_name)
        .bind(config.device_name)
        .bind(config.operator)
        .bind(config.deployment_id)
        .bind(config.content)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
