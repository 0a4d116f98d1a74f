//! Sharing of host PEs among VMs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{ResourceKind, WORK_EPSILON};
use crate::core::error::CloudError;
use crate::core::pe::Pe;

/// Discipline used by host to share its PEs among VMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VmSchedulingPolicy {
    /// VMs share PEs concurrently, shares are scaled down when total demand exceeds host capacity.
    #[default]
    TimeShared,
    /// Each VM gets exclusive PEs.
    SpaceShared,
}

#[derive(Clone, Debug)]
struct PeRequest {
    mips: f64,
    pes: u32,
}

/// Allocates host PEs to VMs according to the scheduling policy.
///
/// PE capacities are changed only through the PE provisioners, so the allocated capacity of a PE
/// never exceeds its MIPS.
#[derive(Clone, Debug)]
pub struct VmScheduler {
    policy: VmSchedulingPolicy,
    requests: BTreeMap<u32, PeRequest>,
    pe_map: BTreeMap<u32, Vec<u32>>,
    shares: BTreeMap<u32, Vec<f64>>,
}

impl VmScheduler {
    pub fn new(policy: VmSchedulingPolicy) -> Self {
        Self {
            policy,
            requests: BTreeMap::new(),
            pe_map: BTreeMap::new(),
            shares: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> VmSchedulingPolicy {
        self.policy
    }

    /// Checks whether the VM requesting `vm_pes` virtual PEs of `mips` each can be placed.
    pub fn can_allocate(&self, pes: &[Pe], mips: f64, vm_pes: u32) -> Result<(), CloudError> {
        let requested = mips * vm_pes as f64;
        match self.policy {
            VmSchedulingPolicy::TimeShared => {
                let max_pe_mips = pes.iter().map(|pe| pe.mips()).fold(0., f64::max);
                if vm_pes as usize > pes.len() || mips > max_pe_mips {
                    return Err(CloudError::InsufficientCapacity {
                        resource: ResourceKind::Cpu,
                        requested,
                        available: pes.iter().map(|pe| pe.mips()).sum(),
                    });
                }
            }
            VmSchedulingPolicy::SpaceShared => {
                let suitable = Self::free_suitable_pes(pes, mips);
                if suitable.len() < vm_pes as usize {
                    return Err(CloudError::InsufficientCapacity {
                        resource: ResourceKind::Cpu,
                        requested,
                        available: suitable.len() as f64 * mips,
                    });
                }
            }
        }
        Ok(())
    }

    /// Allocates PEs for the VM. Nothing is changed if the allocation is not possible.
    pub fn allocate_pes_for_vm(&mut self, pes: &mut [Pe], vm_id: u32, mips: f64, vm_pes: u32) -> Result<(), CloudError> {
        if self.requests.contains_key(&vm_id) {
            self.deallocate_pes_for_vm(pes, vm_id);
        }
        self.can_allocate(pes, mips, vm_pes)?;
        self.requests.insert(vm_id, PeRequest { mips, pes: vm_pes });
        match self.policy {
            VmSchedulingPolicy::TimeShared => self.redistribute(pes),
            VmSchedulingPolicy::SpaceShared => {
                let selected: Vec<usize> = Self::free_suitable_pes(pes, mips)
                    .into_iter()
                    .take(vm_pes as usize)
                    .collect();
                for idx in selected.iter() {
                    pes[*idx].provisioner_mut().allocate(vm_id, mips)?;
                }
                self.pe_map
                    .insert(vm_id, selected.iter().map(|idx| pes[*idx].id).collect());
                self.shares.insert(vm_id, vec![mips; vm_pes as usize]);
            }
        }
        Ok(())
    }

    /// Releases PEs of the VM. Does nothing for unknown VM.
    pub fn deallocate_pes_for_vm(&mut self, pes: &mut [Pe], vm_id: u32) {
        if self.requests.remove(&vm_id).is_none() {
            return;
        }
        self.shares.remove(&vm_id);
        match self.policy {
            VmSchedulingPolicy::TimeShared => {
                self.pe_map.remove(&vm_id);
                self.redistribute(pes);
            }
            VmSchedulingPolicy::SpaceShared => {
                if let Some(pe_ids) = self.pe_map.remove(&vm_id) {
                    for pe in pes.iter_mut().filter(|pe| pe_ids.contains(&pe.id)) {
                        pe.provisioner_mut().deallocate(vm_id);
                    }
                }
            }
        }
    }

    /// Returns MIPS allocated to each virtual PE of the VM.
    pub fn mips_share(&self, vm_id: u32) -> Vec<f64> {
        self.shares.get(&vm_id).cloned().unwrap_or_default()
    }

    pub fn total_allocated_mips_for_vm(&self, vm_id: u32) -> f64 {
        self.shares.get(&vm_id).map(|s| s.iter().sum()).unwrap_or(0.)
    }

    /// Returns IDs of physical PEs serving the VM.
    pub fn pes_for_vm(&self, vm_id: u32) -> Vec<u32> {
        self.pe_map.get(&vm_id).cloned().unwrap_or_default()
    }

    /// Returns MIPS requested by all VMs, which may exceed the capacity under time sharing.
    pub fn requested_mips(&self) -> f64 {
        self.requests.values().map(|r| r.mips * r.pes as f64).sum()
    }

    pub fn vm_count(&self) -> usize {
        self.requests.len()
    }

    fn free_suitable_pes(pes: &[Pe], mips: f64) -> Vec<usize> {
        pes.iter()
            .enumerate()
            .filter(|(_, pe)| pe.is_free() && pe.mips() >= mips)
            .map(|(idx, _)| idx)
            .collect()
    }

    // Recomputes time-shared slices of all VMs: when total demand exceeds the capacity of host PEs
    // every share is multiplied by capacity / demand. Slices are laid out over PEs sequentially.
    fn redistribute(&mut self, pes: &mut [Pe]) {
        for pe in pes.iter_mut() {
            pe.provisioner_mut().deallocate_all();
        }
        self.pe_map.clear();
        self.shares.clear();

        let capacity: f64 = pes.iter().map(|pe| pe.mips()).sum();
        let demand: f64 = self.requests.values().map(|r| r.mips * r.pes as f64).sum();
        let factor = if demand > capacity { capacity / demand } else { 1. };

        let mut cursor = 0;
        for (vm_id, request) in self.requests.iter() {
            let share = request.mips * factor;
            let mut used_pes = Vec::new();
            for _ in 0..request.pes {
                let mut remaining = share;
                while remaining > WORK_EPSILON && cursor < pes.len() {
                    let pe = &mut pes[cursor];
                    let amount = remaining.min(pe.available_mips());
                    if amount > 0. && pe.provisioner_mut().allocate(*vm_id, amount).is_ok() {
                        remaining -= amount;
                        if !used_pes.contains(&pe.id) {
                            used_pes.push(pe.id);
                        }
                    }
                    if pe.available_mips() <= WORK_EPSILON {
                        cursor += 1;
                    }
                }
            }
            self.pe_map.insert(*vm_id, used_pes);
            self.shares.insert(*vm_id, vec![share; request.pes as usize]);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn pes(count: u32, mips: f64) -> Vec<Pe> {
        (0..count).map(|id| Pe::new(id, mips)).collect()
    }

    #[test]
    fn test_time_shared_without_contention() {
        let mut pes = pes(2, 1000.);
        let mut scheduler = VmScheduler::new(VmSchedulingPolicy::TimeShared);
        for vm_id in 0..3 {
            scheduler.allocate_pes_for_vm(&mut pes, vm_id, 250., 1).unwrap();
        }
        for vm_id in 0..3 {
            assert_eq!(scheduler.mips_share(vm_id), vec![250.]);
        }
        assert_relative_eq!(pes[0].allocated_mips(), 750.);
        assert_relative_eq!(pes[1].allocated_mips(), 0.);
    }

    #[test]
    fn test_time_shared_scales_shares_when_oversubscribed() {
        let mut pes = pes(2, 1000.);
        let mut scheduler = VmScheduler::new(VmSchedulingPolicy::TimeShared);
        for vm_id in 0..3 {
            scheduler.allocate_pes_for_vm(&mut pes, vm_id, 1000., 1).unwrap();
        }
        for vm_id in 0..3 {
            assert_relative_eq!(scheduler.total_allocated_mips_for_vm(vm_id), 2000. / 3., epsilon = 1e-6);
        }
        for pe in pes.iter() {
            assert!(pe.allocated_mips() <= pe.mips() + 1e-6);
        }

        scheduler.deallocate_pes_for_vm(&mut pes, 1);
        assert_relative_eq!(scheduler.total_allocated_mips_for_vm(0), 1000.);
        assert_relative_eq!(scheduler.total_allocated_mips_for_vm(2), 1000.);
        assert!(scheduler.mips_share(1).is_empty());
    }

    #[test]
    fn test_time_shared_rejects_too_large_vm() {
        let mut pes = pes(2, 1000.);
        let mut scheduler = VmScheduler::new(VmSchedulingPolicy::TimeShared);
        assert!(scheduler.allocate_pes_for_vm(&mut pes, 0, 1500., 1).is_err());
        assert!(scheduler.allocate_pes_for_vm(&mut pes, 0, 500., 3).is_err());
        assert_eq!(scheduler.vm_count(), 0);
        assert_relative_eq!(pes[0].allocated_mips(), 0.);
    }

    #[test]
    fn test_space_shared_gives_exclusive_pes() {
        let mut pes = pes(2, 1000.);
        let mut scheduler = VmScheduler::new(VmSchedulingPolicy::SpaceShared);
        scheduler.allocate_pes_for_vm(&mut pes, 0, 250., 1).unwrap();
        scheduler.allocate_pes_for_vm(&mut pes, 1, 250., 1).unwrap();
        assert_eq!(scheduler.pes_for_vm(0), vec![0]);
        assert_eq!(scheduler.pes_for_vm(1), vec![1]);

        let err = scheduler.allocate_pes_for_vm(&mut pes, 2, 250., 1).unwrap_err();
        assert!(matches!(
            err,
            CloudError::InsufficientCapacity {
                resource: ResourceKind::Cpu,
                ..
            }
        ));

        scheduler.deallocate_pes_for_vm(&mut pes, 0);
        scheduler.deallocate_pes_for_vm(&mut pes, 0);
        assert!(pes[0].is_free());
        scheduler.allocate_pes_for_vm(&mut pes, 2, 250., 1).unwrap();
        assert_eq!(scheduler.pes_for_vm(2), vec![0]);
    }
}
