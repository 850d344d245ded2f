use anyhow::Result;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_latch_row;

/// Per-customer generation error latch operations
pub struct ErrorLatchRepo;

impl ErrorLatchRepo {
    pub async fn get(pool: &Pool<Sqlite>, customer: &str) -> Result<Option<ErrorLatch>> {
        let row = sqlx::query(
            "SELECT error_message, error_code, timestamp FROM error_latches WHERE customer_name = ?",
        )
        .bind(customer)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_latch_row))
    }

    pub async fn put(pool: &Pool<Sqlite>, customer: &str, latch: &ErrorLatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO error_latches (customer_name, error_message, error_code, timestamp)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(customer_name) DO UPDATE SET
                error_message = excluded.error_message,
                error_code = excluded.error_code,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(customer)
        .bind(&latch.error_message)
        .bind(latch.error_code as i64)
        .bind(latch.timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn clear(pool: &Pool<Sqlite>, customer: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM error_latches WHERE customer_name = ?")
            .bind(customer)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
