//! Execution of cloudlets inside a VM.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::WORK_EPSILON;
use crate::core::error::CloudError;

/// Discipline used by VM to share its virtual PEs among cloudlets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CloudletSchedulingPolicy {
    /// All admitted cloudlets run concurrently and share VM capacity.
    #[default]
    TimeShared,
    /// Cloudlets get exclusive virtual PEs, others wait in FIFO order.
    SpaceShared,
}

// Cloudlet together with its execution progress.
#[derive(Clone, Debug)]
struct ResCloudlet {
    cloudlet: Cloudlet,
    // remaining work over all requested PEs, in MI
    remaining: f64,
}

impl ResCloudlet {
    fn new(cloudlet: Cloudlet) -> Self {
        let remaining = cloudlet.length as f64 * cloudlet.pes as f64;
        Self { cloudlet, remaining }
    }

    fn id(&self) -> u32 {
        self.cloudlet.id
    }

    fn pes(&self) -> u32 {
        self.cloudlet.pes
    }
}

/// Tracks cloudlets submitted to a VM and advances their execution in simulated time.
///
/// The scheduler does not emit events itself. The owner calls [`update_processing`](Self::update_processing)
/// with the current VM MIPS share at every point the share or the set of cloudlets changes, and schedules
/// the next update at the returned completion time.
#[derive(Clone, Debug)]
pub struct CloudletScheduler {
    policy: CloudletSchedulingPolicy,
    vm_pes: u32,
    exec: Vec<ResCloudlet>,
    waiting: VecDeque<ResCloudlet>,
    paused: Vec<ResCloudlet>,
    finished: Vec<Cloudlet>,
    previous_time: f64,
}

impl CloudletScheduler {
    pub fn new(policy: CloudletSchedulingPolicy, vm_pes: u32, time: f64) -> Self {
        Self {
            policy,
            vm_pes,
            exec: Vec::new(),
            waiting: VecDeque::new(),
            paused: Vec::new(),
            finished: Vec::new(),
            previous_time: time,
        }
    }

    pub fn policy(&self) -> CloudletSchedulingPolicy {
        self.policy
    }

    /// Accepts a cloudlet for execution.
    ///
    /// A cloudlet requesting more PEs than the VM has is failed immediately and placed to the finished list.
    /// Under space sharing a cloudlet without free virtual PEs waits in SUBMITTED status.
    pub fn submit(&mut self, mut cloudlet: Cloudlet, time: f64) -> Result<(), CloudError> {
        if cloudlet.status() == CloudletStatus::Created {
            cloudlet.set_status(CloudletStatus::Submitted);
        }
        if cloudlet.pes == 0 || cloudlet.pes > self.vm_pes {
            let err = CloudError::InsufficientVmCapacity {
                cloudlet_id: cloudlet.id,
                vm_id: cloudlet.vm_id(),
            };
            cloudlet.fail(err.clone());
            self.finished.push(cloudlet);
            return Err(err);
        }
        let mut rcl = ResCloudlet::new(cloudlet);
        match self.policy {
            CloudletSchedulingPolicy::TimeShared => {
                rcl.cloudlet.start(time);
                self.exec.push(rcl);
            }
            CloudletSchedulingPolicy::SpaceShared => {
                if self.waiting.is_empty() && rcl.pes() <= self.free_pes() {
                    rcl.cloudlet.start(time);
                    self.exec.push(rcl);
                } else {
                    self.waiting.push_back(rcl);
                }
            }
        }
        Ok(())
    }

    /// Advances executing cloudlets to the given time using the VM MIPS share (MIPS per virtual PE)
    /// and returns the earliest predicted completion time, if any cloudlet is executing.
    pub fn update_processing(&mut self, time: f64, mips_share: &[f64]) -> Option<f64> {
        let elapsed = (time - self.previous_time).max(0.);
        if elapsed > 0. {
            let capacity = self.capacity(mips_share);
            for rcl in self.exec.iter_mut() {
                rcl.remaining -= capacity * rcl.pes() as f64 * elapsed;
            }
        }
        self.previous_time = time;

        let mut idx = 0;
        while idx < self.exec.len() {
            if self.exec[idx].remaining <= WORK_EPSILON {
                let mut rcl = self.exec.remove(idx);
                rcl.cloudlet.complete(time);
                self.finished.push(rcl.cloudlet);
            } else {
                idx += 1;
            }
        }
        self.admit_waiting(time);

        let capacity = self.capacity(mips_share);
        self.exec
            .iter()
            .filter_map(|rcl| {
                let rate = capacity * rcl.pes() as f64;
                if rate > 0. {
                    Some(time + rcl.remaining.max(0.) / rate)
                } else {
                    None
                }
            })
            .reduce(f64::min)
    }

    /// Cancels the cloudlet and returns it. Returns `None` if the cloudlet is unknown or already finished.
    pub fn cancel(&mut self, cloudlet_id: u32, time: f64) -> Option<Cloudlet> {
        let mut rcl = self.remove_active(cloudlet_id)?;
        rcl.cloudlet.cancel(time);
        Some(rcl.cloudlet)
    }

    /// Cancels all unfinished cloudlets.
    pub fn cancel_all(&mut self, time: f64) -> Vec<Cloudlet> {
        let mut canceled = Vec::new();
        let active = self
            .exec
            .drain(..)
            .chain(self.waiting.drain(..))
            .chain(self.paused.drain(..))
            .collect::<Vec<_>>();
        for mut rcl in active {
            rcl.cloudlet.cancel(time);
            canceled.push(rcl.cloudlet);
        }
        canceled
    }

    /// Suspends the cloudlet keeping its progress. Returns false if it is not executing or waiting.
    pub fn pause(&mut self, cloudlet_id: u32) -> bool {
        if let Some(pos) = self.exec.iter().position(|rcl| rcl.id() == cloudlet_id) {
            let mut rcl = self.exec.remove(pos);
            rcl.cloudlet.set_status(CloudletStatus::Paused);
            self.paused.push(rcl);
            return true;
        }
        if let Some(pos) = self.waiting.iter().position(|rcl| rcl.id() == cloudlet_id) {
            if let Some(mut rcl) = self.waiting.remove(pos) {
                rcl.cloudlet.set_status(CloudletStatus::Paused);
                self.paused.push(rcl);
                return true;
            }
        }
        false
    }

    /// Resumes a paused cloudlet. Under space sharing it joins the end of the waiting list unless the list is
    /// empty and enough PEs are free.
    pub fn resume(&mut self, cloudlet_id: u32, time: f64) -> bool {
        let pos = match self.paused.iter().position(|rcl| rcl.id() == cloudlet_id) {
            Some(pos) => pos,
            None => return false,
        };
        let mut rcl = self.paused.remove(pos);
        let can_run = match self.policy {
            CloudletSchedulingPolicy::TimeShared => true,
            CloudletSchedulingPolicy::SpaceShared => self.waiting.is_empty() && rcl.pes() <= self.free_pes(),
        };
        if can_run {
            rcl.cloudlet.start(time);
            self.exec.push(rcl);
        } else {
            rcl.cloudlet.set_status(CloudletStatus::Submitted);
            self.waiting.push_back(rcl);
        }
        true
    }

    /// Returns cloudlets that reached a terminal state since the last call.
    pub fn take_finished(&mut self) -> Vec<Cloudlet> {
        std::mem::take(&mut self.finished)
    }

    pub fn exec_count(&self) -> usize {
        self.exec.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn paused_count(&self) -> usize {
        self.paused.len()
    }

    /// Returns true if there are no executing, waiting or paused cloudlets.
    pub fn is_idle(&self) -> bool {
        self.exec.is_empty() && self.waiting.is_empty() && self.paused.is_empty()
    }

    /// Returns remaining work of the cloudlet in MI, if the cloudlet is active.
    pub fn remaining_work(&self, cloudlet_id: u32) -> Option<f64> {
        self.exec
            .iter()
            .chain(self.waiting.iter())
            .chain(self.paused.iter())
            .find(|rcl| rcl.id() == cloudlet_id)
            .map(|rcl| rcl.remaining.max(0.))
    }

    fn free_pes(&self) -> u32 {
        let used: u32 = self.exec.iter().map(|rcl| rcl.pes()).sum();
        self.vm_pes.saturating_sub(used)
    }

    // MIPS available to a single cloudlet PE.
    fn capacity(&self, mips_share: &[f64]) -> f64 {
        let total: f64 = mips_share.iter().sum();
        let cpus = mips_share.iter().filter(|mips| **mips > 0.).count() as u32;
        let divisor = match self.policy {
            CloudletSchedulingPolicy::TimeShared => {
                let pes_in_use: u32 = self.exec.iter().map(|rcl| rcl.pes()).sum();
                pes_in_use.max(cpus)
            }
            CloudletSchedulingPolicy::SpaceShared => cpus,
        };
        if divisor == 0 {
            0.
        } else {
            total / divisor as f64
        }
    }

    fn admit_waiting(&mut self, time: f64) {
        while let Some(rcl) = self.waiting.front() {
            if rcl.pes() > self.free_pes() {
                break;
            }
            if let Some(mut rcl) = self.waiting.pop_front() {
                rcl.cloudlet.start(time);
                self.exec.push(rcl);
            }
        }
    }

    fn remove_active(&mut self, cloudlet_id: u32) -> Option<ResCloudlet> {
        if let Some(pos) = self.exec.iter().position(|rcl| rcl.id() == cloudlet_id) {
            return Some(self.exec.remove(pos));
        }
        if let Some(pos) = self.waiting.iter().position(|rcl| rcl.id() == cloudlet_id) {
            return self.waiting.remove(pos);
        }
        if let Some(pos) = self.paused.iter().position(|rcl| rcl.id() == cloudlet_id) {
            return Some(self.paused.remove(pos));
        }
        None
    }
}
