use anyhow::Result;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::models::*;
use crate::registry::Registry;

/// Outcome of the eligibility checks. Denied whenever any reason is present.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Authorization {
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latch: Option<ErrorLatch>,
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn message(&self) -> String {
        self.reasons.join(" ")
    }
}

/// Decides whether configuration generation may proceed for a customer service
pub struct EligibilityGate {
    registry: Arc<Registry>,
}

impl EligibilityGate {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Evaluate every rule and collect all failures
    pub async fn authorize(
        &self,
        customer: &str,
        access_device: &str,
        pe_device: &str,
        interface_name: &str,
    ) -> Result<Authorization> {
        let access = self.registry.device(access_device);
        let pe = self.registry.device(pe_device);
        let mut reasons = Vec::new();

        if access.is_none() {
            reasons.push(format!("Access device {} not found in inventory.", access_device));
        }
        if pe.is_none() {
            reasons.push(format!("PE device {} not found in inventory.", pe_device));
        }

        if let Some(msg) = role_mismatch(access, pe) {
            reasons.push(msg);
        }

        if let Some(access) = access {
            if let Some(pattern) = forbidden_match(access, interface_name) {
                reasons.push(format!(
                    "Interface {} on {} is forbidden for customer provisioning (matches '{}').",
                    interface_name, access.name, pattern
                ));
            }
        }

        if let Some(msg) = provisioning_block(access, pe) {
            reasons.push(msg);
        }

        let latch = self.registry.backend().get_error_latch(customer).await?;
        if let Some(latch) = &latch {
            reasons.push(format!(
                "Customer {} has an unresolved generation error (code {}): {} Clear it before deploying.",
                customer, latch.error_code, latch.error_message
            ));
        }

        if !reasons.is_empty() {
            tracing::info!("Authorization denied for {}: {}", customer, reasons.join(" "));
        }
        Ok(Authorization { reasons, latch })
    }
}

fn role_mismatch(access: Option<&DeviceDescriptor>, pe: Option<&DeviceDescriptor>) -> Option<String> {
    let bad_access = access.filter(|d| d.device_role != DeviceRole::Access);
    let bad_pe = pe.filter(|d| d.device_role != DeviceRole::Pe);
    match (bad_access, bad_pe) {
        (Some(a), Some(p)) => Some(format!(
            "Invalid device roles: {} is {} (expected access) and {} is {} (expected pe).",
            a.name, a.device_role, p.name, p.device_role
        )),
        (Some(a), None) => Some(format!(
            "Device {} has role {}, expected access.",
            a.name, a.device_role
        )),
        (None, Some(p)) => Some(format!("Device {} has role {}, expected pe.", p.name, p.device_role)),
        (None, None) => None,
    }
}

/// First forbidden pattern matching the start of the interface name
fn forbidden_match<'a>(device: &'a DeviceDescriptor, interface_name: &str) -> Option<&'a str> {
    device
        .forbidden_interfaces
        .iter()
        .find(|pattern| match Regex::new(&format!("^(?:{})", pattern)) {
            Ok(re) => re.is_match(interface_name),
            Err(e) => {
                tracing::warn!(
                    "Invalid forbidden_interfaces pattern '{}' on {}: {}; comparing literally",
                    pattern,
                    device.name,
                    e
                );
                interface_name.starts_with(pattern.as_str())
            }
        })
        .map(String::as_str)
}

fn provisioning_block(access: Option<&DeviceDescriptor>, pe: Option<&DeviceDescriptor>) -> Option<String> {
    let blocked: Vec<&str> = [access, pe]
        .into_iter()
        .flatten()
        .filter(|d| !d.customer_provisioning)
        .map(|d| d.name.as_str())
        .collect();
    match blocked.as_slice() {
        [] => None,
        [one] => Some(format!("Customer provisioning is disabled on {}.", one)),
        [a, b, ..] => Some(format!("Customer provisioning is disabled on both {} and {}.", a, b)),
    }
}
