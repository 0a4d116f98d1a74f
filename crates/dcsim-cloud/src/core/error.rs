//! Errors produced by resource allocation, scheduling and simulation setup.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::ResourceKind;

/// Error taxonomy of the datacenter model.
///
/// Allocation failures are local: they end up as a failed VM or cloudlet status and never abort the simulation.
/// `InvalidAssignment` and `InvalidConfiguration` describe structural problems and are reported before the
/// simulation starts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CloudError {
    /// A provisioner cannot satisfy the request.
    InsufficientCapacity {
        resource: ResourceKind,
        requested: f64,
        available: f64,
    },
    /// No host can accommodate the VM.
    NoSuitableHost { vm_id: u32 },
    /// The cloudlet cannot be admitted onto its VM (VM is missing or too small).
    InsufficientVmCapacity { cloudlet_id: u32, vm_id: Option<u32> },
    /// Scheduling policy named a nonexistent VM or cloudlet, or the cloudlet cannot be rebound.
    InvalidAssignment { cloudlet_id: u32, vm_id: Option<u32> },
    /// Simulation setup is structurally wrong.
    InvalidConfiguration(String),
}

impl Display for CloudError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CloudError::InsufficientCapacity {
                resource,
                requested,
                available,
            } => write!(
                f,
                "insufficient {} capacity: requested {}, available {}",
                resource, requested, available
            ),
            CloudError::NoSuitableHost { vm_id } => write!(f, "no suitable host for vm #{}", vm_id),
            CloudError::InsufficientVmCapacity { cloudlet_id, vm_id } => match vm_id {
                Some(vm_id) => write!(f, "vm #{} cannot admit cloudlet #{}", vm_id, cloudlet_id),
                None => write!(f, "cloudlet #{} is not bound to any vm", cloudlet_id),
            },
            CloudError::InvalidAssignment { cloudlet_id, vm_id } => match vm_id {
                Some(vm_id) => write!(f, "invalid assignment of cloudlet #{} to vm #{}", cloudlet_id, vm_id),
                None => write!(f, "invalid assignment of cloudlet #{}", cloudlet_id),
            },
            CloudError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for CloudError {}
