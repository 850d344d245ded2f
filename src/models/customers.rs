use chrono::{DateTime, Utc};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use super::DeviceType;

/// Shape of the L2 service between access and PE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    P2p,
    P2mp,
}

impl ServiceType {
    pub const ALL: [ServiceType; 2] = [ServiceType::P2p, ServiceType::P2mp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::P2p => "p2p",
            ServiceType::P2mp => "p2mp",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template action rendered for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    // Declaration order is push order within a device session
    Remove,
    Activate,
    Deactivate,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Remove, Action::Activate, Action::Deactivate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Activate => "activate",
            Action::Remove => "remove",
            Action::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CustomerAllocation is the resource set held by one customer service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAllocation {
    pub name: String,
    #[serde(alias = "access_device")]
    pub access_device_name: String,
    #[serde(alias = "interface_name")]
    pub access_interface: String,
    #[serde(alias = "pe_device")]
    pub pe_device_name: String,
    pub circuit_id: u16,
    pub vlan_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id_outer: Option<u16>,
    #[serde(alias = "pw_id")]
    pub pseudowire_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irb_ipv4_prefix: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irb_ipv6_prefix: Option<Ipv6Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_lan_route: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_lan_route: Option<Ipv6Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_nexthop: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_nexthop: Option<Ipv6Addr>,
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_instance_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos_output: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub const CIRCUIT_ID_RANGE: std::ops::RangeInclusive<u16> = 1..=4000;
pub const VLAN_ID_RANGE: std::ops::RangeInclusive<u16> = 1..=4095;

impl CustomerAllocation {
    /// Check numeric identifiers against their permitted ranges
    pub fn check_ranges(&self) -> Result<(), String> {
        if !CIRCUIT_ID_RANGE.contains(&self.circuit_id) {
            return Err(format!(
                "Circuit ID {} is out of range (1-4000).",
                self.circuit_id
            ));
        }
        if !VLAN_ID_RANGE.contains(&self.vlan_id) {
            return Err(format!("VLAN ID {} is out of range (1-4095).", self.vlan_id));
        }
        if let Some(outer) = self.vlan_id_outer {
            if !VLAN_ID_RANGE.contains(&outer) {
                return Err(format!("Outer VLAN ID {} is out of range (1-4095).", outer));
            }
        }
        Ok(())
    }

    pub fn irb_v4(&self) -> Option<IpNet> {
        self.irb_ipv4_prefix.map(IpNet::V4)
    }

    pub fn irb_v6(&self) -> Option<IpNet> {
        self.irb_ipv6_prefix.map(IpNet::V6)
    }

    pub fn lan_v4(&self) -> Option<IpNet> {
        self.ipv4_lan_route.map(IpNet::V4)
    }

    pub fn lan_v6(&self) -> Option<IpNet> {
        self.ipv6_lan_route.map(IpNet::V6)
    }

    /// Service instance defaults to the VLAN when not set explicitly
    pub fn effective_service_instance(&self) -> u32 {
        self.service_instance_id.unwrap_or(self.vlan_id as u32)
    }
}

/// ErrorLatch blocks deployments for a customer until cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLatch {
    pub error_message: String,
    pub error_code: u16,
    pub timestamp: DateTime<Utc>,
}

impl ErrorLatch {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            error_code: 400,
            timestamp: Utc::now(),
        }
    }

    pub fn rendering(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            error_code: 500,
            timestamp: Utc::now(),
        }
    }
}

/// GeneratedArtifact is a rendered configuration blob for one device and action
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub customer_name: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub action: Action,
    pub path: PathBuf,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CustomerAllocation {
        serde_json::from_value(serde_json::json!({
            "name": "ACME",
            "access_device_name": "access-01",
            "access_interface": "Gig1",
            "pe_device_name": "pe-01",
            "circuit_id": 10,
            "vlan_id": 100,
            "pseudowire_id": 5000,
            "irb_ipv4_prefix": "10.0.0.1/30",
            "service_type": "p2p"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_on_deserialize() {
        let c = sample();
        assert!(c.active);
        assert_eq!(c.vlan_id_outer, None);
        assert_eq!(c.irb_ipv4_prefix.unwrap().prefix_len(), 30);
        assert_eq!(c.effective_service_instance(), 100);
    }

    #[test]
    fn test_rejects_malformed_prefix() {
        let result: Result<CustomerAllocation, _> = serde_json::from_value(serde_json::json!({
            "name": "ACME",
            "access_device_name": "access-01",
            "access_interface": "Gig1",
            "pe_device_name": "pe-01",
            "circuit_id": 10,
            "vlan_id": 100,
            "pseudowire_id": 5000,
            "irb_ipv4_prefix": "10.0.0.300/30",
            "service_type": "p2p"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_ranges() {
        let mut c = sample();
        assert!(c.check_ranges().is_ok());

        c.circuit_id = 4001;
        assert_eq!(
            c.check_ranges().unwrap_err(),
            "Circuit ID 4001 is out of range (1-4000)."
        );

        c.circuit_id = 1;
        c.vlan_id = 0;
        assert!(c.check_ranges().unwrap_err().starts_with("VLAN ID 0"));

        c.vlan_id = 4095;
        c.vlan_id_outer = Some(4096);
        assert!(c.check_ranges().unwrap_err().starts_with("Outer VLAN ID 4096"));
    }

    #[test]
    fn test_action_push_order() {
        let mut actions = vec![Action::Activate, Action::Remove];
        actions.sort();
        assert_eq!(actions, vec![Action::Remove, Action::Activate]);
    }
}
