use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use dcsim_core::Id;

/// Amount of remaining work (in million instructions) below which a cloudlet is considered complete.
pub const WORK_EPSILON: f64 = 1e-6;

/// Datacenter-wide key of an entity submitted by a user: ID of the owning broker and entity ID.
///
/// VM and cloudlet IDs are assigned by users, so two brokers may use the same ID.
pub type OwnedId = (Id, u32);

/// Host resource tracked by a provisioner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Cpu,
    Ram,
    Bandwidth,
    Storage,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "cpu"),
            ResourceKind::Ram => write!(f, "ram"),
            ResourceKind::Bandwidth => write!(f, "bandwidth"),
            ResourceKind::Storage => write!(f, "storage"),
        }
    }
}

/// Result of successful VM placement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VmPlacement {
    pub vm_id: u32,
    pub host_id: u32,
}
