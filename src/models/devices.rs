use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor platform of a managed network element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    CiscoXe,
    CiscoXr,
    JuniperJunos,
    HuaweiVrp,
    HuaweiVrpXpl,
}

impl DeviceType {
    pub const ALL: [DeviceType; 5] = [
        DeviceType::CiscoXe,
        DeviceType::CiscoXr,
        DeviceType::JuniperJunos,
        DeviceType::HuaweiVrp,
        DeviceType::HuaweiVrpXpl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::CiscoXe => "cisco_xe",
            DeviceType::CiscoXr => "cisco_xr",
            DeviceType::JuniperJunos => "juniper_junos",
            DeviceType::HuaweiVrp => "huawei_vrp",
            DeviceType::HuaweiVrpXpl => "huawei_vrp_xpl",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown device type: {}", s))
    }
}

/// Role a device plays in the access service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Access,
    Pe,
    P,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Access => "access",
            DeviceRole::Pe => "pe",
            DeviceRole::P => "p",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(DeviceRole::Access),
            "pe" => Ok(DeviceRole::Pe),
            "p" => Ok(DeviceRole::P),
            other => Err(anyhow::anyhow!("Unknown device role: {}", other)),
        }
    }
}

/// DeviceDescriptor is one managed network element from the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub device_type: DeviceType,
    pub device_role: DeviceRole,
    pub mgmt_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loopback_address: Option<String>,
    pub customer_provisioning: bool,
    #[serde(default)]
    pub forbidden_interfaces: Vec<String>,
}

/// Inventory entry as it appears in the YAML inventory, keyed by device name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InventoryEntry {
    pub device_type: DeviceType,
    pub device_role: DeviceRole,
    #[serde(alias = "mgmt_address")]
    pub ip_address: String,
    #[serde(default, alias = "loopback_address")]
    pub loopback: Option<String>,
    #[serde(default)]
    pub customer_provisioning: bool,
    #[serde(default)]
    pub forbidden_interfaces: Vec<String>,
}

impl InventoryEntry {
    pub fn into_descriptor(self, name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.to_string(),
            device_type: self.device_type,
            device_role: self.device_role,
            mgmt_address: self.ip_address,
            loopback_address: self.loopback.filter(|s| !s.is_empty()),
            customer_provisioning: self.customer_provisioning,
            forbidden_interfaces: self.forbidden_interfaces,
        }
    }
}
