mod audit_logs;
mod customers;
mod deployed_configs;
mod devices;
mod error_latches;
pub(crate) mod row_helpers;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::backend::Backend;
use crate::models::*;

use audit_logs::AuditLogRepo;
use customers::CustomerRepo;
use deployed_configs::DeployedConfigRepo;
use devices::DeviceRepo;
use error_latches::ErrorLatchRepo;

const DEPLOYED_CONFIG_PREFIX: &str = "deployed_configs/";

/// Typed "resource not found" error, downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Logical path under which a deployed artifact row is referenced from audit entries
pub fn deployed_config_path(id: i64) -> String {
    format!("{}{}", DEPLOYED_CONFIG_PREFIX, id)
}

fn deployed_config_id(path: &str) -> Option<i64> {
    path.strip_prefix(DEPLOYED_CONFIG_PREFIX)?.parse().ok()
}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load inventory records from a YAML file into the devices table.
    /// Returns the number of devices written.
    pub async fn import_devices(&self, inventory_file: &str) -> Result<usize> {
        let content = tokio::fs::read_to_string(inventory_file)
            .await
            .with_context(|| format!("Failed to read inventory {}", inventory_file))?;
        let inventory: std::collections::BTreeMap<String, InventoryEntry> =
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse inventory {}", inventory_file))?;

        let count = inventory.len();
        for (name, entry) in inventory {
            DeviceRepo::upsert(&self.pool, &entry.into_descriptor(&name)).await?;
        }
        Ok(count)
    }
}

#[async_trait]
impl Backend for Store {
    fn kind(&self) -> &'static str {
        "database"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        DeviceRepo::list(&self.pool).await
    }

    async fn list_customers(&self) -> Result<Vec<CustomerAllocation>> {
        CustomerRepo::list(&self.pool).await
    }

    async fn get_customer(&self, name: &str) -> Result<Option<CustomerAllocation>> {
        CustomerRepo::get(&self.pool, name).await
    }

    async fn save_customer(&self, customer: &CustomerAllocation) -> Result<()> {
        CustomerRepo::upsert(&self.pool, customer).await
    }

    async fn delete_customer(&self, name: &str) -> Result<bool> {
        CustomerRepo::delete(&self.pool, name).await
    }

    async fn get_error_latch(&self, customer: &str) -> Result<Option<ErrorLatch>> {
        ErrorLatchRepo::get(&self.pool, customer).await
    }

    async fn put_error_latch(&self, customer: &str, latch: &ErrorLatch) -> Result<()> {
        ErrorLatchRepo::put(&self.pool, customer, latch).await
    }

    async fn clear_error_latch(&self, customer: &str) -> Result<bool> {
        ErrorLatchRepo::clear(&self.pool, customer).await
    }

    async fn latest_deployed_config(
        &self,
        customer: &str,
        device: &str,
    ) -> Result<Option<DeployedConfig>> {
        DeployedConfigRepo::latest(&self.pool, customer, device).await
    }

    async fn save_deployed_config(&self, config: &NewDeployedConfig<'_>) -> Result<String> {
        let id = DeployedConfigRepo::create(&self.pool, config).await?;
        Ok(deployed_config_path(id))
    }

    async fn read_deployed_config(&self, path: &str) -> Result<Option<String>> {
        let Some(id) = deployed_config_id(path) else {
            return Ok(None);
        };
        Ok(DeployedConfigRepo::get(&self.pool, id).await?.map(|c| c.content))
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        AuditLogRepo::append(&self.pool, entry).await
    }

    async fn list_audit_entries(&self, customer: Option<&str>) -> Result<Vec<AuditEntry>> {
        AuditLogRepo::list(&self.pool, customer).await
    }

    async fn audit_entries_for(&self, deployment_id: &str) -> Result<Vec<AuditEntry>> {
        AuditLogRepo::list_by_deployment(&self.pool, deployment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> Store {
        let path = dir.path().join("test.db");
        Store::with_pool_size(&path.to_string_lossy(), 1).await.unwrap()
    }

    #[test]
    fn test_deployed_config_path_roundtrip() {
        assert_eq!(deployed_config_path(42), "deployed_configs/42");
        assert_eq!(deployed_config_id("deployed_configs/42"), Some(42));
        assert_eq!(deployed_config_id("/data/deployed_configs/x.txt"), None);
    }

    #[tokio::test]
    async fn test_import_devices() {
        let dir = TempDir::new().unwrap();
        let inventory = dir.path().join("devices.yaml");
        tokio::fs::write(&inventory, testutil::INVENTORY_YAML).await.unwrap();

        let store = store(&dir).await;
        let count = store.import_devices(&inventory.to_string_lossy()).await.unwrap();
        assert_eq!(count, 4);

        let devices = store.list_devices().await.unwrap();
        let access = devices.iter().find(|d| d.name == "access-01").unwrap();
        assert_eq!(access.device_type, DeviceType::CiscoXe);
        assert_eq!(access.device_role, DeviceRole::Access);
        assert!(access.customer_provisioning);
        assert_eq!(access.forbidden_interfaces.len(), 2);

        // Re-import is idempotent
        store.import_devices(&inventory.to_string_lossy()).await.unwrap();
        assert_eq!(store.list_devices().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_customer_upsert_and_unique_backstop() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut acme = testutil::customer("ACME", 100);
        store.save_customer(&acme).await.unwrap();
        acme.qos_output = Some("20M".to_string());
        store.save_customer(&acme).await.unwrap();
        assert_eq!(store.get_customer("ACME").await.unwrap(), Some(acme));

        // Same access port and VLAN under a different name hits the unique index
        let mut clash = testutil::customer("BETA", 100);
        clash.circuit_id = 999;
        tokio_test::assert_err!(store.save_customer(&clash).await);

        assert!(store.delete_customer("ACME").await.unwrap());
        assert!(store.get_customer("ACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_latch_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.put_error_latch("ACME", &ErrorLatch::validation("first")).await.unwrap();
        store.put_error_latch("ACME", &ErrorLatch::rendering("second")).await.unwrap();
        let latch = store.get_error_latch("ACME").await.unwrap().unwrap();
        assert_eq!(latch.error_message, "second");
        assert_eq!(latch.error_code, 500);

        assert!(store.clear_error_latch("ACME").await.unwrap());
        assert!(store.get_error_latch("ACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deployed_configs_and_audit_logs() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut paths = Vec::new();
        for (id, content) in [("20240101_000000", "first"), ("20240102_000000", "second")] {
            let path = store
                .save_deployed_config(&NewDeployedConfig {
                    customer_name: "ACME",
                    device_name: "pe-01",
                    operator: "alice",
                    deployment_id: id,
                    content,
                })
                .await
                .unwrap();
            paths.push(path);
        }

        let latest = store.latest_deployed_config("ACME", "pe-01").await.unwrap().unwrap();
        assert_eq!(latest.content, "second");
        assert_eq!(latest.path, paths[1]);
        assert_eq!(
            store.read_deployed_config(&paths[0]).await.unwrap().as_deref(),
            Some("first")
        );

        let a = testutil::audit_entry("20240101_000000", "ACME", "pe-01");
        let b = testutil::audit_entry("20240102_000000", "BETA", "pe-01");
        store.append_audit_entry(&a).await.unwrap();
        store.append_audit_entry(&b).await.unwrap();
        assert_eq!(store.list_audit_entries(None).await.unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(store.list_audit_entries(Some("BETA")).await.unwrap(), vec![b]);
        assert_eq!(store.audit_entries_for("20240101_000000").await.unwrap(), vec![a]);
    }
}
