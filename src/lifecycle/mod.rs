use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::Arc;

use crate::db::NotFoundError;
use crate::deploy::{DeploymentOrchestrator, DeploymentReport};
use crate::error::ProvisionError;
use crate::gate::{Authorization, EligibilityGate};
use crate::models::*;
use crate::registry::{Allocation, Deletion, Registry, Reservation};
use crate::render::{self, TemplateRenderer};
use crate::utils;
use crate::ws::Hub;

/// Terminal state of one lifecycle request.
///
/// Requests move REQUESTED -> AUTHORIZED -> ALLOCATED -> RENDERED -> DEPLOYED | FAILED;
/// each variant records where a request stopped.
#[derive(Debug)]
pub enum LifecycleOutcome {
    Denied(Authorization),
    Conflict(String),
    GenerationFailed(ErrorLatch),
    DeploymentFailed(DeploymentReport),
    Deployed(DeploymentReport),
}

/// Drives a customer request from authorization to deployment and owns the error latch
pub struct LifecycleController {
    registry: Arc<Registry>,
    gate: EligibilityGate,
    renderer: Arc<dyn TemplateRenderer>,
    orchestrator: DeploymentOrchestrator,
    generated_dir: PathBuf,
    hub: Option<Arc<Hub>>,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<Registry>,
        renderer: Arc<dyn TemplateRenderer>,
        orchestrator: DeploymentOrchestrator,
        generated_dir: impl Into<PathBuf>,
        hub: Option<Arc<Hub>>,
    ) -> Self {
        Self {
            gate: EligibilityGate::new(Arc::clone(&registry)),
            registry,
            renderer,
            orchestrator,
            generated_dir: generated_dir.into(),
            hub,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Activate (or re-activate with new parameters) a customer service
    pub async fn activate(
        &self,
        candidate: CustomerAllocation,
        operator: &Operator,
    ) -> Result<LifecycleOutcome, ProvisionError> {
        let name = candidate.name.clone();
        tracing::info!("Activation requested for {} by {}", name, operator.name);

        let auth = self.authorize(&candidate).await?;
        if !auth.is_allowed() {
            return Ok(LifecycleOutcome::Denied(auth));
        }

        if let Err(msg) = candidate.check_ranges() {
            let latch = self.latch(&name, ErrorLatch::validation(msg)).await?;
            return Ok(LifecycleOutcome::GenerationFailed(latch));
        }

        let mut reservation = match self.registry.reserve(&candidate).await? {
            Allocation::Reserved(r) => r,
            Allocation::Conflict(msg) => {
                tracing::info!("Allocation rejected for {}: {}", name, msg);
                return Ok(LifecycleOutcome::Conflict(msg));
            }
        };
        reservation.allocation_mut().active = true;

        self.render_and_deploy(reservation, &[Action::Remove, Action::Activate], operator)
            .await
    }

    /// Push deactivation templates for a stored customer and mark it inactive
    pub async fn deactivate(
        &self,
        name: &str,
        operator: &Operator,
    ) -> Result<LifecycleOutcome, ProvisionError> {
        tracing::info!("Deactivation requested for {} by {}", name, operator.name);
        let stored = self
            .registry
            .customer(name)
            .await?
            .ok_or_else(|| anyhow::Error::new(NotFoundError::new("Customer", name)))?;

        let auth = self.authorize(&stored).await?;
        if !auth.is_allowed() {
            return Ok(LifecycleOutcome::Denied(auth));
        }

        let mut reservation = match self.registry.hold(&stored).await {
            Allocation::Reserved(r) => r,
            Allocation::Conflict(msg) => return Ok(LifecycleOutcome::Conflict(msg)),
        };
        reservation.allocation_mut().active = false;

        self.render_and_deploy(reservation, &[Action::Deactivate], operator)
            .await
    }

    /// Logically remove a customer allocation
    pub async fn delete(&self, name: &str) -> Result<Deletion, ProvisionError> {
        Ok(self.registry.delete_customer(name).await?)
    }

    pub async fn error_latch(&self, name: &str) -> Result<Option<ErrorLatch>, ProvisionError> {
        Ok(self.registry.backend().get_error_latch(name).await?)
    }

    /// Clear a customer's error latch and discard any artifacts left by the failed run
    pub async fn clear_error(&self, name: &str) -> Result<bool, ProvisionError> {
        let cleared = self.registry.backend().clear_error_latch(name).await?;
        if cleared {
            tracing::info!("Error latch cleared for {}", name);
            self.discard_generated(name).await;
        }
        Ok(cleared)
    }

    async fn authorize(&self, customer: &CustomerAllocation) -> Result<Authorization, ProvisionError> {
        Ok(self
            .gate
            .authorize(
                &customer.name,
                &customer.access_device_name,
                &customer.pe_device_name,
                &customer.access_interface,
            )
            .await?)
    }

    async fn render_and_deploy(
        &self,
        reservation: Reservation,
        actions: &[Action],
        operator: &Operator,
    ) -> Result<LifecycleOutcome, ProvisionError> {
        let customer = reservation.allocation();
        let artifacts = match self.render(customer, actions) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                let latch = self.latch(&customer.name, ErrorLatch::rendering(format!("{:#}", e))).await?;
                return Ok(LifecycleOutcome::GenerationFailed(latch));
            }
        };
        self.write_generated(&artifacts).await?;
        if self.registry.backend().clear_error_latch(&customer.name).await? {
            tracing::info!("Cleared previous error latch for {}", customer.name);
        }

        let report = self
            .orchestrator
            .deploy(&customer.name, operator, &artifacts)
            .await?;
        if !report.succeeded() {
            // Reservation drops here; the stored allocation is left untouched
            return Ok(LifecycleOutcome::DeploymentFailed(report));
        }

        reservation.commit().await?;
        self.remove_generated(&artifacts).await;
        Ok(LifecycleOutcome::Deployed(report))
    }

    /// Render every action for the access and PE devices of a customer
    fn render(
        &self,
        customer: &CustomerAllocation,
        actions: &[Action],
    ) -> anyhow::Result<Vec<GeneratedArtifact>> {
        let access = self
            .registry
            .device(&customer.access_device_name)
            .with_context(|| format!("Device {} is not in the inventory", customer.access_device_name))?;
        let pe = self
            .registry
            .device(&customer.pe_device_name)
            .with_context(|| format!("Device {} is not in the inventory", customer.pe_device_name))?;

        let mut artifacts = Vec::new();
        for device in [access, pe] {
            let context = render::build_context(customer, access, pe, device);
            for &action in actions {
                let template = render::template_name(device.device_type, customer.service_type, action);
                let content = self.renderer.render(&template, &context).with_context(|| {
                    format!("Configuration generation failed for {} on {}", customer.name, device.name)
                })?;
                artifacts.push(GeneratedArtifact {
                    customer_name: customer.name.clone(),
                    device_name: device.name.clone(),
                    device_type: device.device_type,
                    action,
                    path: self.generated_dir.join(utils::generated_config_filename(
                        &customer.name,
                        &device.name,
                        customer.service_type,
                        action,
                    )),
                    content,
                });
            }
        }
        Ok(artifacts)
    }

    async fn latch(&self, customer: &str, latch: ErrorLatch) -> Result<ErrorLatch, ProvisionError> {
        tracing::error!(
            "Generation failed for {} (code {}): {}",
            customer,
            latch.error_code,
            latch.error_message
        );
        self.registry.backend().put_error_latch(customer, &latch).await?;
        if let Some(hub) = &self.hub {
            hub.broadcast_generation_failed(customer, latch.error_code, &latch.error_message)
                .await;
        }
        Ok(latch)
    }

    async fn write_generated(&self, artifacts: &[GeneratedArtifact]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.generated_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.generated_dir.display()))?;
        for artifact in artifacts {
            tokio::fs::write(&artifact.path, &artifact.content)
                .await
                .with_context(|| format!("Failed to write {}", artifact.path.display()))?;
        }
        Ok(())
    }

    async fn remove_generated(&self, artifacts: &[GeneratedArtifact]) {
        for artifact in artifacts {
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                tracing::warn!("Failed to remove generated artifact {}: {}", artifact.path.display(), e);
            }
        }
    }

    /// Remove generated artifacts of a customer left behind by an earlier run.
    /// Only filenames this customer could have produced are considered.
    async fn discard_generated(&self, customer: &str) {
        for device in self.registry.devices() {
            for service in ServiceType::ALL {
                for action in Action::ALL {
                    let path = self.generated_dir.join(utils::generated_config_filename(
                        customer,
                        &device.name,
                        service,
                        action,
                    ));
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => tracing::info!("Discarded generated artifact {}", path.display()),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!("Failed to remove generated artifact {}: {}", path.display(), e)
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTrail;
    use crate::backend::{Backend, FileBackend};
    use crate::render::TeraRenderer;
    use crate::testutil::{self, RecordingTransport};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        backend: Arc<dyn Backend>,
        controller: LifecycleController,
        transport: Arc<RecordingTransport>,
    }

    async fn fixture_with(transport: RecordingTransport, renderer: TeraRenderer) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        tokio::fs::write(root.join("devices.yaml"), testutil::INVENTORY_YAML).await.unwrap();
        let backend: Arc<dyn Backend> = Arc::new(FileBackend::with_dirs(
            root,
            root.join("deployed"),
            root.join("audit"),
            root.join("errors"),
        ));
        let registry = Registry::load(Arc::clone(&backend)).await.unwrap();
        let audit = Arc::new(AuditTrail::new(Arc::clone(&backend)));
        let transport = Arc::new(transport);
        let orchestrator =
            DeploymentOrchestrator::new(Arc::clone(&registry), audit, transport.clone(), None);
        let controller = LifecycleController::new(
            registry,
            Arc::new(renderer),
            orchestrator,
            root.join("generated"),
            None,
        );
        Fixture {
            dir,
            backend,
            controller,
            transport,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingTransport::default(), testutil::renderer()).await
    }

    fn operator() -> Operator {
        Operator::new("alice", "198.51.100.7")
    }

    fn generated_files(f: &Fixture) -> usize {
        std::fs::read_dir(f.dir.path().join("generated"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_activation_deploys_and_commits() {
        let f = fixture().await;
        let outcome = f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap();

        let report = match outcome {
            LifecycleOutcome::Deployed(report) => report,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(report.entries.len(), 2);
        assert_eq!(f.transport.pushed_devices(), vec!["access-01", "pe-01"]);
        assert_eq!(f.backend.get_customer("ACME").await.unwrap(), Some(testutil::customer("ACME", 100)));
        assert_eq!(generated_files(&f), 0);
    }

    #[tokio::test]
    async fn test_conflicting_customer_is_not_pushed() {
        let f = fixture().await;
        f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap();

        let outcome = f.controller.activate(testutil::customer("BETA", 100), &operator()).await.unwrap();
        match outcome {
            LifecycleOutcome::Conflict(msg) => assert_eq!(
                msg,
                "Conflict: VLAN ID 100 on access-01 Gig1 is already in use by customer ACME."
            ),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(f.transport.pushed_devices().len(), 2);
        assert!(f.backend.get_customer("BETA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_denied_request_does_not_latch() {
        let f = fixture().await;
        let mut customer = testutil::customer("ACME", 100);
        customer.access_interface = "Mgmt0".to_string();

        let outcome = f.controller.activate(customer, &operator()).await.unwrap();
        assert!(matches!(outcome, LifecycleOutcome::Denied(_)));
        assert!(f.controller.error_latch("ACME").await.unwrap().is_none());
        assert!(f.transport.pushed_devices().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_latches_400() {
        let f = fixture().await;
        let mut customer = testutil::customer("ACME", 100);
        customer.circuit_id = 4001;

        match f.controller.activate(customer, &operator()).await.unwrap() {
            LifecycleOutcome::GenerationFailed(latch) => {
                assert_eq!(latch.error_code, 400);
                assert_eq!(latch.error_message, "Circuit ID 4001 is out of range (1-4000).");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(f.dir.path().join("errors/ACME_error.json").exists());
    }

    #[tokio::test]
    async fn test_clear_error_keeps_artifacts_of_similarly_named_customers() {
        let f = fixture().await;
        let generated = f.dir.path().join("generated");
        tokio::fs::create_dir_all(&generated).await.unwrap();
        let own = generated.join("ACME_pe-01_p2p_config.txt");
        let other = generated.join("ACME_2_pe-01_p2p_config.txt");
        tokio::fs::write(&own, "vlan 100").await.unwrap();
        tokio::fs::write(&other, "vlan 200").await.unwrap();

        f.backend
            .put_error_latch("ACME", &ErrorLatch::rendering("boom"))
            .await
            .unwrap();
        assert!(f.controller.clear_error("ACME").await.unwrap());

        assert!(!own.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_render_failure_latches_until_cleared() {
        // Only access templates exist, so rendering for pe-01 fails
        let renderer = TeraRenderer::from_raw([
            ("cisco_xe/p2p_activate.j2", "vlan {{ vlan_id }}"),
            ("cisco_xe/p2p_remove.j2", "no vlan {{ vlan_id }}"),
        ])
        .unwrap();
        let f = fixture_with(RecordingTransport::default(), renderer).await;

        match f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap() {
            LifecycleOutcome::GenerationFailed(latch) => {
                assert_eq!(latch.error_code, 500);
                assert!(latch.error_message.contains("pe-01"), "{}", latch.error_message);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(f.transport.pushed_devices().is_empty());

        // The latch blocks further attempts
        match f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap() {
            LifecycleOutcome::Denied(auth) => assert_eq!(auth.latch.map(|l| l.error_code), Some(500)),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // The failed reservation was released: another customer can take the VLAN
        assert!(f.controller.registry().check(&testutil::customer("BETA", 100)).await.unwrap().is_empty());

        assert!(f.controller.clear_error("ACME").await.unwrap());
        assert!(!f.controller.clear_error("ACME").await.unwrap());
        assert!(f.controller.error_latch("ACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_allocation_uncommitted() {
        let f = fixture_with(RecordingTransport::failing("pe-01"), testutil::renderer()).await;

        match f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap() {
            LifecycleOutcome::DeploymentFailed(report) => {
                assert_eq!(report.entries.len(), 1);
                assert!(report.failure.unwrap().to_string().contains("pe-01"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(f.backend.get_customer("ACME").await.unwrap().is_none());
        // Generated artifacts stay for inspection
        assert_eq!(generated_files(&f), 4);
        // Nothing is latched for a transport fault
        assert!(f.controller.error_latch("ACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivate_marks_inactive() {
        let f = fixture().await;
        f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap();

        match f.controller.deactivate("ACME", &operator()).await.unwrap() {
            LifecycleOutcome::Deployed(report) => {
                assert!(report.entries.iter().all(|e| e.is_deactivate));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let stored = f.backend.get_customer("ACME").await.unwrap().unwrap();
        assert!(!stored.active);

        let pushes = f.transport.pushes.lock().unwrap();
        assert!(pushes[2].1.iter().any(|c| c == "shutdown vlan 100"));
    }

    #[tokio::test]
    async fn test_deactivate_unknown_customer() {
        let f = fixture().await;
        let err = f.controller.deactivate("GHOST", &operator()).await.unwrap_err();
        match err {
            ProvisionError::Storage(e) => assert!(e.downcast_ref::<NotFoundError>().is_some()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_customer() {
        let f = fixture().await;
        f.controller.activate(testutil::customer("ACME", 100), &operator()).await.unwrap();
        assert_eq!(f.controller.delete("ACME").await.unwrap(), Deletion::Deleted);
        assert_eq!(f.controller.delete("ACME").await.unwrap(), Deletion::NotFound);
    }
}
