//! Shared fixtures for unit tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::TransportError;
use crate::models::*;
use crate::render::TeraRenderer;
use crate::transport::Transport;

pub const INVENTORY_YAML: &str = r#"
access-01:
  device_type: cisco_xe
  device_role: access
  ip_address: 192.0.2.10
  loopback: 10.255.0.1
  customer_provisioning: true
  forbidden_interfaces:
    - GigabitEthernet0/0
    - Mgmt.*
pe-01:
  device_type: cisco_xr
  device_role: pe
  ip_address: 192.0.2.20
  loopback: 10.255.0.2
  customer_provisioning: true
pe-02:
  device_type: juniper_junos
  device_role: pe
  ip_address: 192.0.2.21
  loopback: 10.255.0.3
  customer_provisioning: false
core-01:
  device_type: huawei_vrp
  device_role: p
  ip_address: 192.0.2.30
  customer_provisioning: true
"#;

pub fn devices() -> HashMap<String, DeviceDescriptor> {
    let inventory: std::collections::BTreeMap<String, InventoryEntry> =
        serde_yaml::from_str(INVENTORY_YAML).unwrap();
    inventory
        .into_iter()
        .map(|(name, entry)| (name.clone(), entry.into_descriptor(&name)))
        .collect()
}

/// Customer on access-01/Gig1 towards pe-01; identifiers derive from the VLAN
pub fn customer(name: &str, vlan: u16) -> CustomerAllocation {
    CustomerAllocation {
        name: name.to_string(),
        access_device_name: "access-01".to_string(),
        access_interface: "Gig1".to_string(),
        pe_device_name: "pe-01".to_string(),
        circuit_id: vlan,
        vlan_id: vlan,
        vlan_id_outer: None,
        pseudowire_id: 1000 + vlan as u32,
        irb_ipv4_prefix: Some(format!("10.{}.{}.1/30", vlan / 256, vlan % 256).parse().unwrap()),
        irb_ipv6_prefix: None,
        ipv4_lan_route: None,
        ipv6_lan_route: None,
        ipv4_nexthop: None,
        ipv6_nexthop: None,
        service_type: ServiceType::P2p,
        service_instance_id: None,
        qos_input: None,
        qos_output: None,
        active: true,
    }
}

pub fn audit_entry(deployment_id: &str, customer: &str, device: &str) -> AuditEntry {
    AuditEntry {
        deployment_id: deployment_id.to_string(),
        customer_name: customer.to_string(),
        operator: "alice".to_string(),
        operator_ip: "198.51.100.7".to_string(),
        device_name: device.to_string(),
        device_type: DeviceType::CiscoXr,
        timestamp: Utc::now(),
        elapsed_time: 1.5,
        configuration_path: format!("/data/generated_configs/{}_{}_p2p_config.txt", customer, device),
        deployed_config_path: format!("/data/deployed_configs/{}_{}_{}.txt", customer, device, deployment_id),
        diff_result: diff_result::NO_PREVIOUS.to_string(),
        is_deactivate: false,
    }
}

/// Templates for the access (cisco_xe) and pe (cisco_xr) platforms
pub fn renderer() -> TeraRenderer {
    let mut templates = Vec::new();
    for device_type in ["cisco_xe", "cisco_xr"] {
        templates.push((
            format!("{}/p2p_activate.j2", device_type),
            "! {{ customer_name }} on {{ device_name }}\nvlan {{ vlan_id }} pw {{ pw_id }}\n{% if qos_input %}qos {{ qos_input }}\n{% endif %}".to_string(),
        ));
        templates.push((
            format!("{}/p2p_remove.j2", device_type),
            "no vlan {{ vlan_id }}\n".to_string(),
        ));
        templates.push((
            format!("{}/p2p_deactivate.j2", device_type),
            "shutdown vlan {{ vlan_id }}\n".to_string(),
        ));
    }
    TeraRenderer::from_raw(templates.iter().map(|(n, c)| (n.as_str(), c.as_str()))).unwrap()
}

/// In-memory transport that records every push and can fail a named device
#[derive(Default)]
pub struct RecordingTransport {
    pub pushes: Mutex<Vec<(String, Vec<String>)>>,
    pub fail_device: Option<String>,
}

impl RecordingTransport {
    pub fn failing(device: &str) -> Self {
        Self {
            pushes: Mutex::new(Vec::new()),
            fail_device: Some(device.to_string()),
        }
    }

    pub fn pushed_devices(&self) -> Vec<String> {
        self.pushes.lock().unwrap().iter().map(|(d, _)| d.clone()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn push(
        &self,
        device: &DeviceDescriptor,
        commands: &[String],
    ) -> Result<String, TransportError> {
        if self.fail_device.as_deref() == Some(device.name.as_str()) {
            return Err(TransportError::Connect {
                address: format!("{}:22", device.mgmt_address),
                reason: "connection refused".to_string(),
            });
        }
        self.pushes
            .lock()
            .unwrap()
            .push((device.name.clone(), commands.to_vec()));
        Ok(String::new())
    }
}
