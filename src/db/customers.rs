use anyhow::{Context, Result};
use chrono::Utc;
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::models::*;

/// Stored document layout: `customer_details.devices.{access,pe}` and
/// `customer_details.service_details.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CustomerDocument {
    name: String,
    customer_details: CustomerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CustomerDetails {
    devices: DeviceRefs,
    service_details: ServiceDetails,
    #[serde(default = "default_active")]
    active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceRefs {
    access: AccessRef,
    pe: PeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessRef {
    device_name: String,
    interface_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeRef {
    device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceDetails {
    service_type: ServiceType,
    circuit_id: u16,
    vlan_id: u16,
    #[serde(default)]
    vlan_id_outer: Option<u16>,
    pw_id: u32,
    #[serde(default)]
    irb_ipaddr: Option<Ipv4Net>,
    #[serde(default)]
    irb_ipv6addr: Option<Ipv6Net>,
    #[serde(default)]
    ipv4_lan: Option<Ipv4Net>,
    #[serde(default)]
    ipv4_nexthop: Option<Ipv4Addr>,
    #[serde(default)]
    ipv6_lan: Option<Ipv6Net>,
    #[serde(default)]
    ipv6_nexthop: Option<Ipv6Addr>,
    #[serde(default)]
    service_instance_id: Option<u32>,
    #[serde(default)]
    qos_input: Option<String>,
    #[serde(default)]
    qos_output: Option<String>,
}

fn default_active() -> bool {
    true
}

impl From<&CustomerAllocation> for CustomerDocument {
    fn from(c: &CustomerAllocation) -> Self {
        Self {
            name: c.name.clone(),
            customer_details: CustomerDetails {
                devices: DeviceRefs {
                    access: AccessRef {
                        device_name: c.access_device_name.clone(),
                        interface_name: c.access_interface.clone(),
                    },
                    pe: PeRef {
                        device_name: c.pe_device_name.clone(),
                    },
                },
                service_details: ServiceDetails {
                    service_type: c.service_type,
                    circuit_id: c.circuit_id,
                    vlan_id: c.vlan_id,
                    vlan_id_outer: c.vlan_id_outer,
                    pw_id: c.pseudowire_id,
                    irb_ipaddr: c.irb_ipv4_prefix,
                    irb_ipv6addr: c.irb_ipv6_prefix,
                    ipv4_lan: c.ipv4_lan_route,
                    ipv4_nexthop: c.ipv4_nexthop,
                    ipv6_lan: c.ipv6_lan_route,
                    ipv6_nexthop: c.ipv6_nexthop,
                    service_instance_id: c.service_instance_id,
                    qos_input: c.qos_input.clone(),
                    qos_output: c.qos_output.clone(),
                },
                active: c.active,
            },
        }
    }
}

impl From<CustomerDocument> for CustomerAllocation {
    fn from(doc: CustomerDocument) -> Self {
        let details = doc.customer_details;
        let service = details.service_details;
        Self {
            name: doc.name,
            access_device_name: details.devices.access.device_name,
            access_interface: details.devices.access.interface_name,
            pe_device_name: details.devices.pe.device_name,
            circuit_id: service.circuit_id,
            vlan_id: service.vlan_id,
            vlan_id_outer: service.vlan_id_outer,
            pseudowire_id: service.pw_id,
            irb_ipv4_prefix: service.irb_ipaddr,
            irb_ipv6_prefix: service.irb_ipv6addr,
            ipv4_lan_route: service.ipv4_lan,
            ipv6_lan_route: service.ipv6_lan,
            ipv4_nexthop: service.ipv4_nexthop,
            ipv6_nexthop: service.ipv6_nexthop,
            service_type: service.service_type,
            service_instance_id: service.service_instance_id,
            qos_input: service.qos_input,
            qos_output: service.qos_output,
            active: details.active,
        }
    }
}

fn decode(name: &str, document: &str) -> Result<CustomerAllocation> {
    let doc: CustomerDocument = serde_json::from_str(document)
        .with_context(|| format!("Malformed customer document for {}", name))?;
    Ok(doc.into())
}

/// Customer document database operations
pub struct CustomerRepo;

impl CustomerRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<CustomerAllocation>> {
        let rows = sqlx::query("SELECT name, document FROM customers ORDER BY name")
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| decode(row.get("name"), row.get("document")))
            .collect()
    }

    pub async fn get(pool: &Pool<Sqlite>, name: &str) -> Result<Option<CustomerAllocation>> {
        let row = sqlx::query("SELECT name, document FROM customers WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;

        row.map(|row| decode(row.get("name"), row.get("document")))
            .transpose()
    }

    /// Insert or wholesale-replace; unique indexes reject colliding VLAN/circuit pairs
    pub async fn upsert(pool: &Pool<Sqlite>, customer: &CustomerAllocation) -> Result<()> {
        let document = serde_json::to_string(&CustomerDocument::from(customer))?;
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO customers (name, document, access_device_name, access_interface,
                                   vlan_id, circuit_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                document = excluded.document,
                access_device_name = excluded.access_device_name,
                access_interface = excluded.access_interface,
                vlan_id = excluded.vlan_id,
                circuit_id = excluded.circuit_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&customer.name)
        .bind(&document)
        .bind(&customer.access_device_name)
        .bind(&customer.access_interface)
        .bind(customer.vlan_id as i64)
        .bind(customer.circuit_id as i64)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to store customer {}", customer.name))?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_document_layout() {
        let mut customer = testutil::customer("ACME", 100);
        customer.qos_input = Some("10M".to_string());
        let doc = serde_json::to_value(CustomerDocument::from(&customer)).unwrap();

        assert_eq!(doc["customer_details"]["devices"]["access"]["device_name"], "access-01");
        assert_eq!(doc["customer_details"]["devices"]["access"]["interface_name"], "Gig1");
        assert_eq!(doc["customer_details"]["devices"]["pe"]["device_name"], "pe-01");
        assert_eq!(doc["customer_details"]["service_details"]["vlan_id"], 100);
        assert_eq!(doc["customer_details"]["service_details"]["irb_ipaddr"], "10.0.100.1/30");

        let back: CustomerAllocation =
            serde_json::from_value::<CustomerDocument>(doc).unwrap().into();
        assert_eq!(back, customer);
    }
}
