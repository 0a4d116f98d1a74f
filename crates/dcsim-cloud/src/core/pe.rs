//! Processing element (CPU core) of a host.

use crate::core::common::ResourceKind;
use crate::core::provisioner::ResourceProvisioner;

/// Processing element with fixed capacity in MIPS, whose capacity is provisioned to VMs.
#[derive(Clone, Debug)]
pub struct Pe {
    pub id: u32,
    provisioner: ResourceProvisioner,
}

impl Pe {
    pub fn new(id: u32, mips: f64) -> Self {
        Self {
            id,
            provisioner: ResourceProvisioner::new(ResourceKind::Cpu, mips),
        }
    }

    pub fn mips(&self) -> f64 {
        self.provisioner.capacity()
    }

    pub fn available_mips(&self) -> f64 {
        self.provisioner.available()
    }

    pub fn allocated_mips(&self) -> f64 {
        self.provisioner.allocated()
    }

    /// Returns true if no VM holds any capacity of this PE.
    pub fn is_free(&self) -> bool {
        self.provisioner.vms().next().is_none()
    }

    pub fn provisioner(&self) -> &ResourceProvisioner {
        &self.provisioner
    }

    pub fn provisioner_mut(&mut self) -> &mut ResourceProvisioner {
        &mut self.provisioner
    }
}
