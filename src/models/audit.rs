use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceType;

/// Canonical diff classification values
pub mod diff_result {
    pub const NO_PREVIOUS: &str = "No previous configuration to compare.";
    pub const NO_CHANGES: &str = "No changes detected.";
    pub const DEACTIVATED: &str = "Not applicable (deactivation).";
    pub const REMOVED: &str = "Not applicable (removal).";
}

/// AuditEntry records one device touched by one deployment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub deployment_id: String,
    pub customer_name: String,
    pub operator: String,
    pub operator_ip: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub timestamp: DateTime<Utc>,
    /// Seconds spent pushing to the device
    pub elapsed_time: f64,
    pub configuration_path: String,
    pub deployed_config_path: String,
    pub diff_result: String,
    pub is_deactivate: bool,
}

impl AuditEntry {
    pub fn activation_status(&self) -> &'static str {
        if self.is_deactivate {
            "Deactivation"
        } else if self.diff_result == diff_result::REMOVED {
            "Removal"
        } else if self.diff_result == diff_result::NO_PREVIOUS {
            "New activation"
        } else if self.diff_result == diff_result::NO_CHANGES {
            "Re-activation"
        } else {
            "Re-activation with changes"
        }
    }

    /// Human-readable block written to the per-deployment audit log
    pub fn report_block(&self) -> String {
        let deployed = if self.deployed_config_path.is_empty() {
            "-"
        } else {
            self.deployed_config_path.as_str()
        };
        format!(
            "==================================================\n\
             Deployment ID: {}\n\
             Customer: {}\n\
             Operator: {} ({})\n\
             Timestamp: {}\n\
             Duration: {:.2}s\n\
             Device: {} ({})\n\
             Generated config: {}\n\
             Deployed config: {}\n\
             Result: Success\n\
             Activation status: {}\n\
             Diff:\n{}\n",
            self.deployment_id,
            self.customer_name,
            self.operator,
            self.operator_ip,
            self.timestamp.to_rfc3339(),
            self.elapsed_time,
            self.device_name,
            self.device_type,
            self.configuration_path,
            deployed,
            self.activation_status(),
            self.diff_result,
        )
    }
}

/// One row of the deployment listing, deduplicated by deployment ID
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntrySummary {
    pub deployment_id: String,
    pub customer_name: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
    pub devices: Vec<String>,
    pub is_deactivate: bool,
}

pub const DEFAULT_AUDIT_LIMIT: usize = 500;

/// Filter for audit listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A deployed artifact as persisted by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedConfig {
    pub customer_name: String,
    pub device_name: String,
    pub deployment_id: String,
    pub path: String,
    pub content: String,
}

/// A deployed artifact about to be persisted
#[derive(Debug, Clone)]
pub struct NewDeployedConfig<'a> {
    pub customer_name: &'a str,
    pub device_name: &'a str,
    pub operator: &'a str,
    pub deployment_id: &'a str,
    pub content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(diff: &str, is_deactivate: bool) -> AuditEntry {
        AuditEntry {
            deployment_id: "20240101_120000".to_string(),
            customer_name: "ACME".to_string(),
            operator: "alice".to_string(),
            operator_ip: "198.51.100.7".to_string(),
            device_name: "pe-01".to_string(),
            device_type: DeviceType::CiscoXr,
            timestamp: Utc::now(),
            elapsed_time: 1.5,
            configuration_path: String::new(),
            deployed_config_path: String::new(),
            diff_result: diff.to_string(),
            is_deactivate,
        }
    }

    #[test]
    fn test_activation_status() {
        assert_eq!(entry(diff_result::NO_PREVIOUS, false).activation_status(), "New activation");
        assert_eq!(entry(diff_result::NO_CHANGES, false).activation_status(), "Re-activation");
        assert_eq!(
            entry("--- previous\n+++ current", false).activation_status(),
            "Re-activation with changes"
        );
        assert_eq!(entry(diff_result::DEACTIVATED, true).activation_status(), "Deactivation");
        assert_eq!(entry(diff_result::REMOVED, false).activation_status(), "Removal");
    }

    #[test]
    fn test_report_block() {
        let block = entry(diff_result::NO_PREVIOUS, false).report_block();
        assert!(block.contains("Deployment ID: 20240101_120000\n"));
        assert!(block.contains("Operator: alice (198.51.100.7)\n"));
        assert!(block.contains("Duration: 1.50s\n"));
        assert!(block.contains("Device: pe-01 (cisco_xr)\n"));
        assert!(block.contains("Deployed config: -\n"));
        assert!(block.ends_with("Diff:\nNo previous configuration to compare.\n"));
    }

    #[test]
    fn test_filter_parses_day() {
        let filter: AuditFilter =
            serde_json::from_value(serde_json::json!({"day": "2024-03-05", "limit": 10})).unwrap();
        assert_eq!(filter.day, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(filter.limit, Some(10));
        assert!(filter.customer.is_none());
    }
}
