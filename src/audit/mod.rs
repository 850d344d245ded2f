use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::db::NotFoundError;
use crate::models::*;
use crate::utils::{self, diff};

/// Append-only deployment history with ordering and diff queries
pub struct AuditTrail {
    backend: Arc<dyn Backend>,
    last_id: Mutex<Option<NaiveDateTime>>,
}

impl AuditTrail {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            last_id: Mutex::new(None),
        }
    }

    /// Allocate a deployment identifier. Runs that fall in the same UTC second
    /// are pushed forward a second so identifiers stay unique and sortable.
    pub fn next_deployment_id(&self) -> String {
        self.next_id_at(Utc::now())
    }

    fn next_id_at(&self, now: DateTime<Utc>) -> String {
        let now = now.naive_utc().trunc_subsecs(0);
        let mut last = self.last_id.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if prev >= now => prev + Duration::seconds(1),
            _ => now,
        };
        *last = Some(next);
        utils::format_deployment_id(next.and_utc())
    }

    pub async fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.backend.append_audit_entry(entry).await
    }

    /// Most recently deployed artifact for a customer/device pair
    pub async fn previous_config(&self, customer: &str, device: &str) -> Result<Option<DeployedConfig>> {
        self.backend.latest_deployed_config(customer, device).await
    }

    /// Persist a deployed artifact as the new most recent one; returns its path
    pub async fn store_config(&self, config: &NewDeployedConfig<'_>) -> Result<String> {
        self.backend.save_deployed_config(config).await
    }

    /// The deployment of this customer immediately preceding `current_id`
    pub async fn find_previous_deployment_id(
        &self,
        customer: &str,
        current_id: &str,
    ) -> Result<Option<String>> {
        let ids = self
            .backend
            .list_audit_entries(Some(customer))
            .await?
            .into_iter()
            .map(|e| e.deployment_id);
        Ok(previous_in(ids, current_id))
    }

    /// All entries of one deployment run, in the order they were written
    pub async fn query(&self, deployment_id: &str) -> Result<Vec<AuditEntry>> {
        self.backend.audit_entries_for(deployment_id).await
    }

    /// Deployment runs, newest first, one row per deployment identifier
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEntrySummary>> {
        let entries = self
            .backend
            .list_audit_entries(filter.customer.as_deref())
            .await?;
        Ok(summarize(entries, filter))
    }

    /// Unified diff of deployed configuration between two runs, pairing entries by position
    pub async fn diff_check(&self, from_id: &str, to_id: &str) -> Result<String> {
        let from = self.query(from_id).await?;
        if from.is_empty() {
            return Err(NotFoundError::new("Deployment", from_id).into());
        }
        let to = self.query(to_id).await?;
        if to.is_empty() {
            return Err(NotFoundError::new("Deployment", to_id).into());
        }

        let mut sections = Vec::new();
        for (a, b) in from.iter().zip(to.iter()) {
            let old = self.deployed_text(a).await?;
            let new = self.deployed_text(b).await?;
            let text = diff::unified_diff(
                &old,
                &new,
                &label(a),
                &label(b),
                diff::DEFAULT_CONTEXT,
            );
            if !text.is_empty() {
                sections.push(text);
            }
        }

        if sections.is_empty() {
            Ok(diff_result::NO_CHANGES.to_string())
        } else {
            Ok(sections.join("\n"))
        }
    }

    async fn deployed_text(&self, entry: &AuditEntry) -> Result<String> {
        if entry.deployed_config_path.is_empty() {
            return Ok(String::new());
        }
        match self.backend.read_deployed_config(&entry.deployed_config_path).await? {
            Some(text) => Ok(text),
            None => {
                tracing::warn!(
                    "Deployed config {} referenced by {} is missing",
                    entry.deployed_config_path,
                    entry.deployment_id
                );
                Ok(String::new())
            }
        }
    }
}

fn label(entry: &AuditEntry) -> String {
    if entry.deployed_config_path.is_empty() {
        format!("{} ({})", entry.device_name, entry.deployment_id)
    } else {
        entry.deployed_config_path.clone()
    }
}

/// Sort the identifiers (plus `current_id` if absent) and return the one before `current_id`
pub fn previous_in(ids: impl IntoIterator<Item = String>, current_id: &str) -> Option<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    if !ids.iter().any(|id| id == current_id) {
        ids.push(current_id.to_string());
    }
    ids.sort();
    ids.dedup();
    let pos = ids.iter().position(|id| id == current_id)?;
    pos.checked_sub(1).map(|p| ids[p].clone())
}

fn summarize(entries: Vec<AuditEntry>, filter: &AuditFilter) -> Vec<AuditEntrySummary> {
    let day_prefix = filter.day.map(|d| d.format("%Y%m%d").to_string());
    let mut runs: BTreeMap<String, AuditEntrySummary> = BTreeMap::new();

    for entry in entries {
        if let Some(prefix) = &day_prefix {
            if !entry.deployment_id.starts_with(prefix.as_str()) {
                continue;
            }
        }
        runs.entry(entry.deployment_id.clone())
            .and_modify(|s| {
                if !s.devices.contains(&entry.device_name) {
                    s.devices.push(entry.device_name.clone());
                }
            })
            .or_insert_with(|| AuditEntrySummary {
                deployment_id: entry.deployment_id.clone(),
                customer_name: entry.customer_name.clone(),
                operator: entry.operator.clone(),
                timestamp: entry.timestamp,
                devices: vec![entry.device_name.clone()],
                is_deactivate: entry.is_deactivate,
            });
    }

    runs.into_values()
        .rev()
        .take(filter.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
        .collect()
}
