use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::conflicts;
use crate::models::*;

/// Read view over device inventory and customer allocations.
///
/// The inventory is loaded once and never refreshed. Allocations are read
/// through the backend on every call. Validate-then-commit runs under a
/// single allocation lock; a validated candidate stays visible to other
/// validations as a pending reservation until it is committed or dropped.
pub struct Registry {
    backend: Arc<dyn Backend>,
    devices: HashMap<String, DeviceDescriptor>,
    allocation_lock: tokio::sync::Mutex<()>,
    pending: Mutex<HashMap<String, CustomerAllocation>>,
}

/// Result of asking for an allocation
pub enum Allocation {
    Reserved(Reservation),
    Conflict(String),
}

/// Result of a logical customer removal
#[derive(Debug, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    NotFound,
    InProgress,
}

impl Registry {
    pub async fn load(backend: Arc<dyn Backend>) -> Result<Arc<Self>> {
        let devices: HashMap<String, DeviceDescriptor> = backend
            .list_devices()
            .await?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        tracing::info!("Registry loaded {} devices from {} backend", devices.len(), backend.kind());

        Ok(Arc::new(Self {
            backend,
            devices,
            allocation_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(HashMap::new()),
        }))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn device(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(name)
    }

    /// All devices ordered by name
    pub fn devices(&self) -> Vec<&DeviceDescriptor> {
        let mut devices: Vec<_> = self.devices.values().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    pub async fn customers(&self) -> Result<Vec<CustomerAllocation>> {
        self.backend.list_customers().await
    }

    pub async fn customer(&self, name: &str) -> Result<Option<CustomerAllocation>> {
        self.backend.get_customer(name).await
    }

    /// Dry run: every conflict the candidate has against stored and pending allocations
    pub async fn check(&self, candidate: &CustomerAllocation) -> Result<Vec<String>> {
        let existing = self.snapshot(&candidate.name).await?;
        Ok(conflicts::all_conflicts(candidate, &existing))
    }

    /// Validate the candidate and, when clear, hold its resources until commit or drop
    pub async fn reserve(self: &Arc<Self>, candidate: &CustomerAllocation) -> Result<Allocation> {
        let _guard = self.allocation_lock.lock().await;
        if let Some(msg) = self.in_progress(&candidate.name) {
            return Ok(Allocation::Conflict(msg));
        }

        let existing = self.snapshot(&candidate.name).await?;
        if let Some(msg) = conflicts::validate(candidate, &existing).message() {
            return Ok(Allocation::Conflict(msg.to_string()));
        }

        Ok(Allocation::Reserved(self.insert_pending(candidate)))
    }

    /// Hold a customer's record without re-validating its resources
    pub async fn hold(self: &Arc<Self>, customer: &CustomerAllocation) -> Allocation {
        let _guard = self.allocation_lock.lock().await;
        match self.in_progress(&customer.name) {
            Some(msg) => Allocation::Conflict(msg),
            None => Allocation::Reserved(self.insert_pending(customer)),
        }
    }

    pub async fn delete_customer(&self, name: &str) -> Result<Deletion> {
        let _guard = self.allocation_lock.lock().await;
        if self.in_progress(name).is_some() {
            return Ok(Deletion::InProgress);
        }
        if self.backend.delete_customer(name).await? {
            tracing::info!("Customer {} removed", name);
            Ok(Deletion::Deleted)
        } else {
            Ok(Deletion::NotFound)
        }
    }

    /// Stored allocations plus other customers' pending reservations.
    /// A customer being re-activated holds both its stored and its pending resources.
    async fn snapshot(&self, name: &str) -> Result<Vec<CustomerAllocation>> {
        let mut existing = self.backend.list_customers().await?;
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let held: Vec<CustomerAllocation> = pending
            .values()
            .filter(|c| c.name != name && !existing.contains(c))
            .cloned()
            .collect();
        existing.extend(held);
        Ok(existing)
    }

    fn in_progress(&self, name: &str) -> Option<String> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending
            .contains_key(name)
            .then(|| format!("Conflict: a deployment for customer {} is already in progress.", name))
    }

    fn insert_pending(self: &Arc<Self>, candidate: &CustomerAllocation) -> Reservation {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(candidate.name.clone(), candidate.clone());
        Reservation {
            registry: Arc::clone(self),
            allocation: candidate.clone(),
            committed: false,
        }
    }

    fn release(&self, name: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }
}

/// Pending allocation. Dropping it without `commit` releases the held resources.
pub struct Reservation {
    registry: Arc<Registry>,
    allocation: CustomerAllocation,
    committed: bool,
}

impl Reservation {
    pub fn allocation(&self) -> &CustomerAllocation {
        &self.allocation
    }

    pub fn allocation_mut(&mut self) -> &mut CustomerAllocation {
        &mut self.allocation
    }

    /// Persist the allocation (wholesale replace) and release the reservation
    pub async fn commit(mut self) -> Result<()> {
        let _guard = self.registry.allocation_lock.lock().await;
        self.registry.backend.save_customer(&self.allocation).await?;
        self.registry.release(&self.allocation.name);
        self.committed = true;
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("Releasing uncommitted reservation for {}", self.allocation.name);
            self.registry.release(&self.allocation.name);
        }
    }
}
