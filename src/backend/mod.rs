mod file;

pub use file::FileBackend;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::*;

/// Persistence seam shared by the flat-file and database backends.
///
/// Everything above this trait (registry, gate, audit trail, orchestrator)
/// observes identical semantics regardless of which implementation is
/// selected at startup.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label used in logs
    fn kind(&self) -> &'static str;

    // Inventory
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    // Customer allocations
    async fn list_customers(&self) -> Result<Vec<CustomerAllocation>>;
    async fn get_customer(&self, name: &str) -> Result<Option<CustomerAllocation>>;
    /// Insert or wholesale-replace a customer record
    async fn save_customer(&self, customer: &CustomerAllocation) -> Result<()>;
    async fn delete_customer(&self, name: &str) -> Result<bool>;

    // Error latches
    async fn get_error_latch(&self, customer: &str) -> Result<Option<ErrorLatch>>;
    async fn put_error_latch(&self, customer: &str, latch: &ErrorLatch) -> Result<()>;
    async fn clear_error_latch(&self, customer: &str) -> Result<bool>;

    // Deployed artifacts
    async fn latest_deployed_config(
        &self,
        customer: &str,
        device: &str,
    ) -> Result<Option<DeployedConfig>>;
    /// Persist a deployed artifact and return the path it can be read back from
    async fn save_deployed_config(&self, config: &NewDeployedConfig<'_>) -> Result<String>;
    async fn read_deployed_config(&self, path: &str) -> Result<Option<String>>;

    // Audit entries (append-only)
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()>;
    /// All entries, optionally restricted to one customer, in insertion order
    async fn list_audit_entries(&self, customer: Option<&str>) -> Result<Vec<AuditEntry>>;
    async fn audit_entries_for(&self, deployment_id: &str) -> Result<Vec<AuditEntry>>;
}
