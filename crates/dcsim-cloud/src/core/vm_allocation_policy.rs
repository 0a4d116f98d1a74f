//! Policies selecting a host for a new VM.

use std::collections::BTreeMap;

use dcsim_core::Id;

use crate::core::common::{OwnedId, VmPlacement};
use crate::core::config::parse_config_value;
use crate::core::error::CloudError;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Trait for implementation of VM allocation policies.
///
/// The policy is a function of VM requirements and current hosts state, which returns an ID of host selected
/// for VM placement or `None` if there is no suitable host. Hosts are passed ordered by ascending ID.
pub trait VmAllocationPolicy {
    fn select_host(&self, vm: &VmSpec, hosts: &BTreeMap<u32, Host>) -> Option<u32>;
}

/// Resolves policy from config string such as `FirstFit` or `BestFit`.
pub fn vm_allocation_policy_resolver(config_str: &str) -> Result<Box<dyn VmAllocationPolicy>, CloudError> {
    let (policy_name, _options) = parse_config_value(config_str);
    match policy_name.as_str() {
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        "BestFit" => Ok(Box::new(BestFit::new())),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        _ => Err(CloudError::InvalidConfiguration(format!(
            "unknown vm allocation policy: {}",
            config_str
        ))),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the first suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for FirstFit {
    fn select_host(&self, vm: &VmSpec, hosts: &BTreeMap<u32, Host>) -> Option<u32> {
        hosts
            .values()
            .find(|host| host.is_suitable_for_vm(vm).is_ok())
            .map(|host| host.id)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the most loaded (least free MIPS) suitable host.
#[derive(Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for BestFit {
    fn select_host(&self, vm: &VmSpec, hosts: &BTreeMap<u32, Host>) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_free_mips = f64::INFINITY;
        for host in hosts.values() {
            if host.is_suitable_for_vm(vm).is_ok() && host.free_mips() < min_free_mips {
                min_free_mips = host.free_mips();
                result = Some(host.id);
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the least loaded (most free MIPS) suitable host.
#[derive(Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for WorstFit {
    fn select_host(&self, vm: &VmSpec, hosts: &BTreeMap<u32, Host>) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut max_free_mips = f64::NEG_INFINITY;
        for host in hosts.values() {
            if host.is_suitable_for_vm(vm).is_ok() && host.free_mips() > max_free_mips {
                max_free_mips = host.free_mips();
                result = Some(host.id);
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

struct PlacedVm {
    uid: u32,
    host_id: u32,
}

/// Keeps hosts of datacenter and places VMs on them using the allocation policy.
///
/// VMs are identified by their owner and ID. Hosts know them only by uids assigned here in placement order.
pub struct VmAllocator {
    policy: Box<dyn VmAllocationPolicy>,
    hosts: BTreeMap<u32, Host>,
    vm_table: BTreeMap<OwnedId, PlacedVm>,
    next_uid: u32,
}

impl VmAllocator {
    pub fn new(policy: Box<dyn VmAllocationPolicy>, hosts: Vec<Host>) -> Self {
        Self {
            policy,
            hosts: hosts.into_iter().map(|host| (host.id, host)).collect(),
            vm_table: BTreeMap::new(),
            next_uid: 0,
        }
    }

    /// Selects a host for the VM of the given owner and commits the allocation on it.
    ///
    /// A VM which is already placed is rejected, the existing placement is kept.
    pub fn allocate_host_for_vm(&mut self, owner: Id, vm: &VmSpec) -> Result<VmPlacement, CloudError> {
        if self.vm_table.contains_key(&(owner, vm.id)) {
            return Err(CloudError::InvalidConfiguration(format!(
                "vm #{} of user {} is already placed",
                vm.id, owner
            )));
        }
        let host_id = self
            .policy
            .select_host(vm, &self.hosts)
            .ok_or(CloudError::NoSuitableHost { vm_id: vm.id })?;
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(CloudError::NoSuitableHost { vm_id: vm.id })?;
        let uid = self.next_uid;
        host.create_vm(uid, vm)
            .map_err(|_| CloudError::NoSuitableHost { vm_id: vm.id })?;
        self.next_uid += 1;
        self.vm_table.insert((owner, vm.id), PlacedVm { uid, host_id });
        Ok(VmPlacement { vm_id: vm.id, host_id })
    }

    /// Releases resources of the VM on its host. Returns the host ID or `None` if the VM is not placed.
    pub fn deallocate_host_for_vm(&mut self, owner: Id, vm_id: u32) -> Option<u32> {
        let placed = self.vm_table.remove(&(owner, vm_id))?;
        if let Some(host) = self.hosts.get_mut(&placed.host_id) {
            host.destroy_vm(placed.uid);
        }
        Some(placed.host_id)
    }

    pub fn host_of(&self, owner: Id, vm_id: u32) -> Option<u32> {
        self.vm_table.get(&(owner, vm_id)).map(|placed| placed.host_id)
    }

    pub fn host(&self, host_id: u32) -> Option<&Host> {
        self.hosts.get(&host_id)
    }

    pub fn hosts(&self) -> &BTreeMap<u32, Host> {
        &self.hosts
    }

    /// Returns current MIPS share of the placed VM.
    pub fn mips_share(&self, owner: Id, vm_id: u32) -> Vec<f64> {
        self.vm_table
            .get(&(owner, vm_id))
            .and_then(|placed| self.hosts.get(&placed.host_id).map(|host| host.mips_share(placed.uid)))
            .unwrap_or_default()
    }
}
