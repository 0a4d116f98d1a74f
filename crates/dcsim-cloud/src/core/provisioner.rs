//! Provisioning of a single host resource to VMs.

use std::collections::BTreeMap;

use crate::core::common::ResourceKind;
use crate::core::error::CloudError;

// Relative tolerance used when comparing requested and available amounts.
const CAPACITY_EPSILON: f64 = 1e-9;

/// Tracks allocation of one resource (CPU of a single PE, RAM or bandwidth) from a host to its VMs.
///
/// The sum of allocations never exceeds the capacity. Allocations of the same VM are accumulated,
/// which allows a VM to receive several slices of the same resource.
#[derive(Clone, Debug)]
pub struct ResourceProvisioner {
    resource: ResourceKind,
    capacity: f64,
    available: f64,
    allocations: BTreeMap<u32, f64>,
}

impl ResourceProvisioner {
    pub fn new(resource: ResourceKind, capacity: f64) -> Self {
        Self {
            resource,
            capacity,
            available: capacity,
            allocations: BTreeMap::new(),
        }
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn allocated(&self) -> f64 {
        self.capacity - self.available
    }

    /// Returns the amount currently held by the VM.
    pub fn allocated_for(&self, vm_id: u32) -> f64 {
        self.allocations.get(&vm_id).copied().unwrap_or(0.)
    }

    pub fn can_allocate(&self, amount: f64) -> bool {
        amount <= self.available + CAPACITY_EPSILON * self.capacity.max(1.)
    }

    /// Allocates the amount to the VM if it does not exceed the available capacity.
    pub fn allocate(&mut self, vm_id: u32, amount: f64) -> Result<(), CloudError> {
        if amount < 0. || !self.can_allocate(amount) {
            return Err(CloudError::InsufficientCapacity {
                resource: self.resource,
                requested: amount,
                available: self.available,
            });
        }
        let amount = amount.min(self.available);
        *self.allocations.entry(vm_id).or_insert(0.) += amount;
        self.available -= amount;
        Ok(())
    }

    /// Releases everything held by the VM and returns the released amount.
    ///
    /// Calling it for a VM without allocation does nothing and returns zero.
    pub fn deallocate(&mut self, vm_id: u32) -> f64 {
        match self.allocations.remove(&vm_id) {
            Some(amount) => {
                self.available = (self.available + amount).min(self.capacity);
                amount
            }
            None => 0.,
        }
    }

    /// Releases all allocations.
    pub fn deallocate_all(&mut self) {
        self.allocations.clear();
        self.available = self.capacity;
    }

    /// Returns IDs of VMs holding some amount of the resource.
    pub fn vms(&self) -> impl Iterator<Item = &u32> {
        self.allocations.keys()
    }
}
