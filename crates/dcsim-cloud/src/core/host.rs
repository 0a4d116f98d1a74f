//! Physical host of datacenter.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::common::ResourceKind;
use crate::core::error::CloudError;
use crate::core::pe::Pe;
use crate::core::provisioner::ResourceProvisioner;
use crate::core::vm::VmSpec;
use crate::core::vm_scheduler::{VmScheduler, VmSchedulingPolicy};

/// Host capacities: `pes` processing elements of `mips` MIPS each, RAM (MB), bandwidth and storage (MB).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub pes: u32,
    pub mips: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    #[serde(default)]
    pub vm_scheduler: VmSchedulingPolicy,
}

/// Host with PE, RAM, bandwidth and storage provisioners.
///
/// VM placement is all-or-nothing: either every resource is allocated or host state is left unchanged.
#[derive(Clone, Debug)]
pub struct Host {
    pub id: u32,
    pes: Vec<Pe>,
    ram: ResourceProvisioner,
    bw: ResourceProvisioner,
    storage: ResourceProvisioner,
    vm_scheduler: VmScheduler,
    vms: BTreeSet<u32>,
}

impl Host {
    pub fn new(id: u32, spec: &HostSpec) -> Self {
        Self {
            id,
            pes: (0..spec.pes).map(|pe_id| Pe::new(pe_id, spec.mips)).collect(),
            ram: ResourceProvisioner::new(ResourceKind::Ram, spec.ram as f64),
            bw: ResourceProvisioner::new(ResourceKind::Bandwidth, spec.bw as f64),
            storage: ResourceProvisioner::new(ResourceKind::Storage, spec.storage as f64),
            vm_scheduler: VmScheduler::new(spec.vm_scheduler),
            vms: BTreeSet::new(),
        }
    }

    /// Checks all host resources against VM requirements without changing anything.
    pub fn is_suitable_for_vm(&self, vm: &VmSpec) -> Result<(), CloudError> {
        for (provisioner, amount) in [
            (&self.storage, vm.size),
            (&self.ram, vm.ram),
            (&self.bw, vm.bw),
        ] {
            if !provisioner.can_allocate(amount as f64) {
                return Err(CloudError::InsufficientCapacity {
                    resource: provisioner.resource(),
                    requested: amount as f64,
                    available: provisioner.available(),
                });
            }
        }
        self.vm_scheduler.can_allocate(&self.pes, vm.mips, vm.pes)
    }

    /// Places the VM on the host under the datacenter-wide `uid`.
    pub fn create_vm(&mut self, uid: u32, vm: &VmSpec) -> Result<(), CloudError> {
        if self.vms.contains(&uid) {
            return Ok(());
        }
        self.is_suitable_for_vm(vm)?;
        self.storage.allocate(uid, vm.size as f64)?;
        if let Err(e) = self.ram.allocate(uid, vm.ram as f64) {
            self.storage.deallocate(uid);
            return Err(e);
        }
        if let Err(e) = self.bw.allocate(uid, vm.bw as f64) {
            self.storage.deallocate(uid);
            self.ram.deallocate(uid);
            return Err(e);
        }
        if let Err(e) = self.vm_scheduler.allocate_pes_for_vm(&mut self.pes, uid, vm.mips, vm.pes) {
            self.storage.deallocate(uid);
            self.ram.deallocate(uid);
            self.bw.deallocate(uid);
            return Err(e);
        }
        self.vms.insert(uid);
        Ok(())
    }

    /// Releases all resources held by the VM. Returns false if the VM is not on this host.
    pub fn destroy_vm(&mut self, uid: u32) -> bool {
        if !self.vms.remove(&uid) {
            return false;
        }
        self.vm_scheduler.deallocate_pes_for_vm(&mut self.pes, uid);
        self.storage.deallocate(uid);
        self.ram.deallocate(uid);
        self.bw.deallocate(uid);
        true
    }

    /// Returns MIPS currently allocated to each virtual PE of the VM.
    pub fn mips_share(&self, uid: u32) -> Vec<f64> {
        self.vm_scheduler.mips_share(uid)
    }

    /// Returns datacenter-wide uids of the VMs placed on the host.
    pub fn vms(&self) -> &BTreeSet<u32> {
        &self.vms
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn total_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.mips()).sum()
    }

    pub fn allocated_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.allocated_mips()).sum()
    }

    pub fn available_mips(&self) -> f64 {
        self.total_mips() - self.allocated_mips()
    }

    /// Returns host MIPS not requested by its VMs, negative if the host is oversubscribed.
    pub fn free_mips(&self) -> f64 {
        self.total_mips() - self.vm_scheduler.requested_mips()
    }

    pub fn free_pes(&self) -> usize {
        self.pes.iter().filter(|pe| pe.is_free()).count()
    }

    pub fn ram(&self) -> &ResourceProvisioner {
        &self.ram
    }

    pub fn bw(&self) -> &ResourceProvisioner {
        &self.bw
    }

    pub fn storage(&self) -> &ResourceProvisioner {
        &self.storage
    }
}
