//! Representations of virtual machine and its status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use dcsim_core::Id;

use crate::core::cloudlet_scheduler::{CloudletScheduler, CloudletSchedulingPolicy};

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    Pending,
    Running,
    FailedToAllocate,
    Destroyed,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Pending => write!(f, "pending"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::FailedToAllocate => write!(f, "failed_to_allocate"),
            VmStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Resource requirements of virtual machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VmSpec {
    pub id: u32,
    /// ID of the broker owning the VM.
    pub user_id: Option<Id>,
    /// MIPS of each virtual PE.
    pub mips: f64,
    pub pes: u32,
    pub ram: u64,
    pub bw: u64,
    /// Image size, takes host storage.
    pub size: u64,
    pub vmm: String,
    pub cloudlet_scheduler: CloudletSchedulingPolicy,
}

impl VmSpec {
    pub fn new(
        id: u32,
        mips: f64,
        pes: u32,
        ram: u64,
        bw: u64,
        size: u64,
        cloudlet_scheduler: CloudletSchedulingPolicy,
    ) -> Self {
        Self {
            id,
            user_id: None,
            mips,
            pes,
            ram,
            bw,
            size,
            vmm: "Xen".to_string(),
            cloudlet_scheduler,
        }
    }

    /// Returns total requested MIPS over all virtual PEs.
    pub fn total_mips(&self) -> f64 {
        self.mips * self.pes as f64
    }
}

/// Virtual machine running on a host of datacenter.
#[derive(Clone, Debug)]
pub struct Vm {
    pub spec: VmSpec,
    pub host_id: u32,
    pub created_at: f64,
    pub(crate) cloudlet_scheduler: CloudletScheduler,
}

impl Vm {
    pub fn new(spec: VmSpec, host_id: u32, time: f64) -> Self {
        let cloudlet_scheduler = CloudletScheduler::new(spec.cloudlet_scheduler, spec.pes, time);
        Self {
            spec,
            host_id,
            created_at: time,
            cloudlet_scheduler,
        }
    }

    pub fn id(&self) -> u32 {
        self.spec.id
    }

    pub fn cloudlet_scheduler(&self) -> &CloudletScheduler {
        &self.cloudlet_scheduler
    }
}
