use anyhow::Result;
use std::path::Path;
use tera::{Context, Tera};

use crate::models::*;

/// Turns a template name and context into vendor command text
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_name: &str, context: &Context) -> Result<String>;
}

/// Template selected for a platform, service shape and action
pub fn template_name(device_type: DeviceType, service_type: ServiceType, action: Action) -> String {
    format!("{}/{}_{}.j2", device_type, service_type, action)
}

/// Tera-backed renderer over a directory of `.j2` templates
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Load every `**/*.j2` under the templates directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let glob = format!("{}/**/*.j2", dir.as_ref().display());
        let tera = Tera::new(&glob)
            .map_err(|e| anyhow::anyhow!("Invalid templates in {}: {}", dir.as_ref().display(), e))?;
        tracing::info!(
            "Loaded {} templates from {}",
            tera.get_template_names().count(),
            dir.as_ref().display()
        );
        Ok(Self { tera })
    }

    /// Build from in-memory `(name, content)` pairs
    pub fn from_raw<'a>(templates: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| anyhow::anyhow!("Invalid template: {}", e))?;
        Ok(Self { tera })
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        if !self.tera.get_template_names().any(|n| n == template_name) {
            anyhow::bail!("Template {} not found", template_name);
        }
        self.tera.render(template_name, context).map_err(|e| {
            // Tera nests the useful message in the source chain
            let mut msg = format!("Failed to render {}", template_name);
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                msg = format!("{}: {}", msg, s);
                source = std::error::Error::source(s);
            }
            anyhow::anyhow!(msg)
        })
    }
}

/// Template context for one device of a customer service
pub fn build_context(
    customer: &CustomerAllocation,
    access: &DeviceDescriptor,
    pe: &DeviceDescriptor,
    device: &DeviceDescriptor,
) -> Context {
    let mut context = Context::new();
    context.insert("customer_name", &customer.name);
    context.insert("interface_name", &customer.access_interface);
    context.insert("service_instance_id", &customer.effective_service_instance());
    context.insert("qos_input", &customer.qos_input);
    context.insert("qos_output", &customer.qos_output);
    context.insert("vlan_id", &customer.vlan_id);
    context.insert("vlan_id_outer", &customer.vlan_id_outer);
    context.insert("circuit_id", &customer.circuit_id);
    context.insert("pw_id", &customer.pseudowire_id);
    context.insert("irb_ipaddr", &customer.irb_ipv4_prefix.map(|p| p.to_string()));
    context.insert("irb_ipv6addr", &customer.irb_ipv6_prefix.map(|p| p.to_string()));
    context.insert("ipv4_lan", &customer.ipv4_lan_route.map(|p| p.to_string()));
    context.insert("ipv4_nexthop", &customer.ipv4_nexthop.map(|a| a.to_string()));
    context.insert("ipv6_lan", &customer.ipv6_lan_route.map(|p| p.to_string()));
    context.insert("ipv6_nexthop", &customer.ipv6_nexthop.map(|a| a.to_string()));
    context.insert("access_address", &access.mgmt_address);
    context.insert("pe_address", &pe.mgmt_address);
    context.insert("access_loopback", &access.loopback_address);
    context.insert("pe_loopback", &pe.loopback_address);
    context.insert("device_type", device.device_type.as_str());
    context.insert("device_role", device.device_role.as_str());
    context.insert("device_name", &device.name);
    context
}
