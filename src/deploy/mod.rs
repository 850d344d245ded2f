use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditTrail;
use crate::error::ProvisionError;
use crate::models::*;
use crate::registry::Registry;
use crate::transport::Transport;
use crate::utils::diff;
use crate::ws::{DeploymentPayload, DevicePayload, EventType, Hub};

/// What one deployment run produced
#[derive(Debug)]
pub struct DeploymentReport {
    pub deployment_id: String,
    /// One entry per device successfully pushed, in push order
    pub entries: Vec<AuditEntry>,
    /// Transport failure that stopped the run; devices already pushed stay applied
    pub failure: Option<ProvisionError>,
}

impl DeploymentReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Artifacts of one device, in push order
struct DevicePlan<'a> {
    device: &'a DeviceDescriptor,
    artifacts: Vec<&'a GeneratedArtifact>,
}

/// Pushes rendered artifacts device by device and writes the audit trail
pub struct DeploymentOrchestrator {
    registry: Arc<Registry>,
    audit: Arc<AuditTrail>,
    transport: Arc<dyn Transport>,
    hub: Option<Arc<Hub>>,
}

impl DeploymentOrchestrator {
    pub fn new(
        registry: Arc<Registry>,
        audit: Arc<AuditTrail>,
        transport: Arc<dyn Transport>,
        hub: Option<Arc<Hub>>,
    ) -> Self {
        Self {
            registry,
            audit,
            transport,
            hub,
        }
    }

    /// Deploy a customer's artifacts. Devices are pushed sequentially in the
    /// order they first appear; within a device, removals precede activation.
    /// A transport failure stops the run and is reported in the result.
    /// Storage faults are returned as errors.
    pub async fn deploy(
        &self,
        customer: &str,
        operator: &Operator,
        artifacts: &[GeneratedArtifact],
    ) -> Result<DeploymentReport, ProvisionError> {
        let plans = self.plan(artifacts)?;
        let deployment_id = self.audit.next_deployment_id();
        let device_names: Vec<String> = plans.iter().map(|p| p.device.name.clone()).collect();

        tracing::info!(
            "Deployment {} for {} by {} ({}): {} device(s)",
            deployment_id,
            customer,
            operator.name,
            operator.ip,
            plans.len()
        );
        self.notify_run(EventType::DeploymentStarted, &deployment_id, customer, &device_names, None)
            .await;

        let mut entries = Vec::new();
        let mut failure = None;
        for plan in &plans {
            match self.deploy_device(&deployment_id, customer, operator, plan).await {
                Ok(entry) => {
                    self.notify_device(EventType::DeviceDeployed, &entry.deployment_id, customer, &entry.device_name, Some(entry.activation_status()), None)
                        .await;
                    entries.push(entry);
                }
                Err(ProvisionError::Transport { device, source }) => {
                    tracing::error!("Deployment {} failed on {}: {}", deployment_id, device, source);
                    self.notify_device(EventType::DeviceFailed, &deployment_id, customer, &device, None, Some(source.to_string()))
                        .await;
                    failure = Some(ProvisionError::Transport { device, source });
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let error = failure.as_ref().map(|f| f.to_string());
        self.notify_run(EventType::DeploymentCompleted, &deployment_id, customer, &device_names, error)
            .await;

        Ok(DeploymentReport {
            deployment_id,
            entries,
            failure,
        })
    }

    fn plan<'a>(&'a self, artifacts: &'a [GeneratedArtifact]) -> Result<Vec<DevicePlan<'a>>, ProvisionError> {
        let mut plans: Vec<DevicePlan<'a>> = Vec::new();
        for artifact in artifacts {
            match plans.iter_mut().find(|p| p.device.name == artifact.device_name) {
                Some(plan) => plan.artifacts.push(artifact),
                None => {
                    let device = self.registry.device(&artifact.device_name).ok_or_else(|| {
                        anyhow::anyhow!("Device {} is not in the inventory", artifact.device_name)
                    })?;
                    plans.push(DevicePlan {
                        device,
                        artifacts: vec![artifact],
                    });
                }
            }
        }
        for plan in &mut plans {
            plan.artifacts.sort_by_key(|a| a.action);
        }
        Ok(plans)
    }

    async fn deploy_device(
        &self,
        deployment_id: &str,
        customer: &str,
        operator: &Operator,
        plan: &DevicePlan<'_>,
    ) -> Result<AuditEntry, ProvisionError> {
        let device = plan.device;
        let profile = device.device_type.profile();
        let commands: Vec<String> = plan
            .artifacts
            .iter()
            .flat_map(|a| match a.action {
                Action::Remove => profile.remove_commands(&a.content),
                Action::Activate | Action::Deactivate => profile.config_commands(&a.content),
            })
            .collect();

        let started = Instant::now();
        tracing::info!("Pushing {} command(s) to {} ({})", commands.len(), device.name, device.mgmt_address);
        self.transport
            .push(device, &commands)
            .await
            .map_err(|source| ProvisionError::Transport {
                device: device.name.clone(),
                source,
            })?;
        let elapsed = started.elapsed().as_secs_f64();

        // Last artifact in push order decides how the device is recorded
        let primary = plan
            .artifacts
            .last()
            .ok_or_else(|| anyhow::anyhow!("No artifacts planned for {}", device.name))?;

        let (diff_result, deployed_config_path) = match primary.action {
            Action::Activate => {
                let previous = self.audit.previous_config(customer, &device.name).await?;
                let result = classify_diff(previous.as_ref(), primary);
                let path = self
                    .audit
                    .store_config(&NewDeployedConfig {
                        customer_name: customer,
                        device_name: &device.name,
                        operator: &operator.name,
                        deployment_id,
                        content: &primary.content,
                    })
                    .await?;
                (result, path)
            }
            Action::Deactivate => (diff_result::DEACTIVATED.to_string(), String::new()),
            Action::Remove => (diff_result::REMOVED.to_string(), String::new()),
        };

        let entry = AuditEntry {
            deployment_id: deployment_id.to_string(),
            customer_name: customer.to_string(),
            operator: operator.name.clone(),
            operator_ip: operator.ip.clone(),
            device_name: device.name.clone(),
            device_type: device.device_type,
            timestamp: Utc::now(),
            elapsed_time: elapsed,
            configuration_path: primary.path.to_string_lossy().to_string(),
            deployed_config_path,
            diff_result,
            is_deactivate: primary.action == Action::Deactivate,
        };
        self.audit.record(&entry).await?;
        tracing::info!(
            "Deployed to {} in {:.2}s: {}",
            device.name,
            elapsed,
            entry.activation_status()
        );
        Ok(entry)
    }

    async fn notify_run(
        &self,
        event_type: EventType,
        deployment_id: &str,
        customer: &str,
        devices: &[String],
        error: Option<String>,
    ) {
        if let Some(hub) = &self.hub {
            hub.broadcast_deployment(
                event_type,
                DeploymentPayload {
                    deployment_id: deployment_id.to_string(),
                    customer_name: customer.to_string(),
                    devices: devices.to_vec(),
                    error,
                },
            )
            .await;
        }
    }

    async fn notify_device(
        &self,
        event_type: EventType,
        deployment_id: &str,
        customer: &str,
        device: &str,
        activation_status: Option<&str>,
        error: Option<String>,
    ) {
        if let Some(hub) = &self.hub {
            hub.broadcast_device(
                event_type,
                DevicePayload {
                    deployment_id: deployment_id.to_string(),
                    customer_name: customer.to_string(),
                    device_name: device.to_string(),
                    activation_status: activation_status.map(str::to_string),
                    error,
                },
            )
            .await;
        }
    }
}

/// Classify the new artifact against the previously deployed one
fn classify_diff(previous: Option<&DeployedConfig>, artifact: &GeneratedArtifact) -> String {
    let Some(previous) = previous else {
        return diff_result::NO_PREVIOUS.to_string();
    };
    let text = diff::unified_diff(
        &previous.content,
        &artifact.content,
        &previous.path,
        &artifact.path.to_string_lossy(),
        diff::DEFAULT_CONTEXT,
    );
    if text.is_empty() {
        diff_result::NO_CHANGES.to_string()
    } else {
        text
    }
}
