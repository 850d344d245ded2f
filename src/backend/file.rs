use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::Backend;
use crate::config::Config;
use crate::models::*;
use crate::utils;

const INVENTORY_FILE: &str = "devices.yaml";
const CUSTOMERS_FILE: &str = "customers.yaml";
const AUDIT_INDEX_FILE: &str = "audit_log.jsonl";

/// Flat-file backend: YAML inventory and customers, timestamped artifact files,
/// JSON error latches and text audit logs with a JSON-lines index.
pub struct FileBackend {
    data_dir: PathBuf,
    deployed_dir: PathBuf,
    audit_dir: PathBuf,
    error_dir: PathBuf,
    // Serializes read-modify-write of customers.yaml and audit appends
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(cfg: &Config) -> Self {
        Self::with_dirs(&cfg.data_dir, &cfg.deployed_dir, &cfg.audit_dir, &cfg.error_dir)
    }

    pub fn with_dirs(
        data_dir: impl AsRef<Path>,
        deployed_dir: impl AsRef<Path>,
        audit_dir: impl AsRef<Path>,
        error_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            deployed_dir: deployed_dir.as_ref().to_path_buf(),
            audit_dir: audit_dir.as_ref().to_path_buf(),
            error_dir: error_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_customers(&self) -> Result<Vec<CustomerAllocation>> {
        let path = self.data_dir.join(CUSTOMERS_FILE);
        match read_optional(&path).await? {
            Some(content) if !content.trim().is_empty() => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            _ => Ok(Vec::new()),
        }
    }

    async fn write_customers(&self, customers: &[CustomerAllocation]) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.data_dir.join(CUSTOMERS_FILE);
        let tmp = self.data_dir.join(format!("{}.tmp", CUSTOMERS_FILE));
        let data = serde_yaml::to_string(customers)?;
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn latch_path(&self, customer: &str) -> Result<PathBuf> {
        if !utils::is_valid_name(customer) {
            anyhow::bail!("Invalid customer name: {}", customer);
        }
        Ok(self.error_dir.join(utils::error_latch_filename(customer)))
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let path = self.data_dir.join(INVENTORY_FILE);
        let content = match read_optional(&path).await? {
            Some(content) => content,
            None => {
                tracing::warn!("Inventory {} not found, starting with no devices", path.display());
                return Ok(Vec::new());
            }
        };
        let inventory: BTreeMap<String, InventoryEntry> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(inventory
            .into_iter()
            .map(|(name, entry)| entry.into_descriptor(&name))
            .collect())
    }

    async fn list_customers(&self) -> Result<Vec<CustomerAllocation>> {
        self.read_customers().await
    }

    async fn get_customer(&self, name: &str) -> Result<Option<CustomerAllocation>> {
        Ok(self.read_customers().await?.into_iter().find(|c| c.name == name))
    }

    async fn save_customer(&self, customer: &CustomerAllocation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut customers = self.read_customers().await?;
        match customers.iter_mut().find(|c| c.name == customer.name) {
            Some(existing) => *existing = customer.clone(),
            None => customers.push(customer.clone()),
        }
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        self.write_customers(&customers).await
    }

    async fn delete_customer(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut customers = self.read_customers().await?;
        let before = customers.len();
        customers.retain(|c| c.name != name);
        if customers.len() == before {
            return Ok(false);
        }
        self.write_customers(&customers).await?;
        Ok(true)
    }

    async fn get_error_latch(&self, customer: &str) -> Result<Option<ErrorLatch>> {
        let path = self.latch_path(customer)?;
        match read_optional(&path).await? {
            Some(content) => Ok(Some(
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?,
            )),
            None => Ok(None),
        }
    }

    async fn put_error_latch(&self, customer: &str, latch: &ErrorLatch) -> Result<()> {
        let path = self.latch_path(customer)?;
        tokio::fs::create_dir_all(&self.error_dir).await?;
        let data = serde_json::to_string_pretty(latch)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn clear_error_latch(&self, customer: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.latch_path(customer)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_deployed_config(
        &self,
        customer: &str,
        device: &str,
    ) -> Result<Option<DeployedConfig>> {
        let mut entries = match tokio::fs::read_dir(&self.deployed_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = utils::deployment_id_from_filename(&filename, customer, device) {
                if latest.as_ref().map_or(true, |(best, _)| id > best.as_str()) {
                    latest = Some((id.to_string(), entry.path()));
                }
            }
        }

        match latest {
            Some((deployment_id, path)) => {
                let content = tokio::fs::read_to_string(&path).await?;
                Ok(Some(DeployedConfig {
                    customer_name: customer.to_string(),
                    device_name: device.to_string(),
                    deployment_id,
                    path: path.to_string_lossy().to_string(),
                    content,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_deployed_config(&self, config: &NewDeployedConfig<'_>) -> Result<String> {
        tokio::fs::create_dir_all(&self.deployed_dir).await?;
        let filename = utils::deployed_config_filename(
            config.customer_name,
            config.device_name,
            config.deployment_id,
        );
        let path = self.deployed_dir.join(filename);
        tokio::fs::write(&path, config.content).await?;
        Ok(path.to_string_lossy().to_string())
    }

    async fn read_deployed_config(&self, path: &str) -> Result<Option<String>> {
        read_optional(Path::new(path)).await
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.audit_dir).await?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        append(&self.audit_dir.join(AUDIT_INDEX_FILE), &line).await?;

        let report = self
            .audit_dir
            .join(utils::audit_log_filename(&entry.customer_name, &entry.deployment_id));
        append(&report, &entry.report_block()).await
    }

    async fn list_audit_entries(&self, customer: Option<&str>) -> Result<Vec<AuditEntry>> {
        let path = self.audit_dir.join(AUDIT_INDEX_FILE);
        let content = match read_optional(&path).await? {
            Some(content) => content,
            None => return Ok(Vec::new()),
        };

        let mut entries = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => {
                    if customer.map_or(true, |c| entry.customer_name == c) {
                        entries.push(entry);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed audit line {} in {}: {}", n + 1, path.display(), e);
                }
            }
        }
        Ok(entries)
    }

    async fn audit_entries_for(&self, deployment_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .list_audit_entries(None)
            .await?
            .into_iter()
            .filter(|e| e.deployment_id == deployment_id)
            .collect())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display()))),
    }
}

async fn append(path: &Path, data: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> FileBackend {
        let root = dir.path();
        FileBackend::with_dirs(root, root.join("deployed"), root.join("audit"), root.join("errors"))
    }

    #[tokio::test]
    async fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        assert!(backend.list_devices().await.unwrap().is_empty());
        assert!(backend.list_customers().await.unwrap().is_empty());
        assert!(backend.get_error_latch("ACME").await.unwrap().is_none());
        assert!(backend.latest_deployed_config("ACME", "pe-01").await.unwrap().is_none());
        assert!(backend.list_audit_entries(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_customer_save_replaces_wholesale() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        let mut acme = testutil::customer("ACME", 100);
        backend.save_customer(&acme).await.unwrap();
        backend.save_customer(&testutil::customer("BETA", 200)).await.unwrap();

        acme.vlan_id = 101;
        acme.active = false;
        backend.save_customer(&acme).await.unwrap();

        let customers = backend.list_customers().await.unwrap();
        assert_eq!(customers.len(), 2);
        let stored = backend.get_customer("ACME").await.unwrap().unwrap();
        assert_eq!(stored, acme);

        assert!(backend.delete_customer("ACME").await.unwrap());
        assert!(!backend.delete_customer("ACME").await.unwrap());
        assert_eq!(backend.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inventory_loaded_from_yaml() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join(INVENTORY_FILE), testutil::INVENTORY_YAML)
            .await
            .unwrap();
        let devices = backend(&dir).list_devices().await.unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["access-01", "core-01", "pe-01", "pe-02"]);
    }

    #[tokio::test]
    async fn test_error_latch_file() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let latch = ErrorLatch::rendering("template missing");
        backend.put_error_latch("ACME", &latch).await.unwrap();

        assert!(dir.path().join("errors/ACME_error.json").exists());
        assert_eq!(backend.get_error_latch("ACME").await.unwrap(), Some(latch));
        assert!(backend.clear_error_latch("ACME").await.unwrap());
        assert!(!backend.clear_error_latch("ACME").await.unwrap());
    }

    #[tokio::test]
    async fn test_error_latch_rejects_path_names() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let outside = dir.path().join("victim_error.json");
        tokio::fs::write(&outside, "{}").await.unwrap();

        assert!(backend.clear_error_latch("../victim").await.is_err());
        assert!(backend.get_error_latch("../victim").await.is_err());
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn test_latest_deployed_config_picks_newest() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        for (id, content) in [("20240102_000000", "second"), ("20240101_000000", "first")] {
            backend
                .save_deployed_config(&NewDeployedConfig {
                    customer_name: "ACME",
                    device_name: "pe-01",
                    operator: "alice",
                    deployment_id: id,
                    content,
                })
                .await
                .unwrap();
        }

        let latest = backend.latest_deployed_config("ACME", "pe-01").await.unwrap().unwrap();
        assert_eq!(latest.deployment_id, "20240102_000000");
        assert_eq!(latest.content, "second");
        assert!(latest.path.ends_with("ACME_pe-01_20240102_000000.txt"));
        assert!(backend.latest_deployed_config("ACME", "access-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_entries_index_and_report() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let first = testutil::audit_entry("20240101_000000", "ACME", "pe-01");
        let second = testutil::audit_entry("20240101_000000", "ACME", "access-01");
        let other = testutil::audit_entry("20240102_000000", "BETA", "pe-01");
        for e in [&first, &second, &other] {
            backend.append_audit_entry(e).await.unwrap();
        }

        assert_eq!(backend.list_audit_entries(Some("ACME")).await.unwrap(), vec![first.clone(), second]);
        assert_eq!(backend.audit_entries_for("20240102_000000").await.unwrap(), vec![other]);

        let report = tokio::fs::read_to_string(
            dir.path().join("audit/ACME_config_deploy_20240101_000000_audit.txt"),
        )
        .await
        .unwrap();
        assert_eq!(report.matches("Deployment ID: 20240101_000000").count(), 2);
    }
}
