//! Representation of cloudlet (computational task) and its status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use dcsim_core::Id;

use crate::core::error::CloudError;

/// Status of cloudlet.
///
/// Transitions: `Created -> Submitted -> InExec -> (Success | Failed | Canceled | Paused -> InExec)`.
/// A submitted cloudlet can also fail or be cancelled before it starts, and a paused one can be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CloudletStatus {
    Created,
    Submitted,
    InExec,
    Paused,
    Success,
    Failed,
    Canceled,
}

impl CloudletStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CloudletStatus::Success | CloudletStatus::Failed | CloudletStatus::Canceled
        )
    }

    /// Checks whether the state machine allows moving to the given status.
    pub fn can_transition_to(&self, next: CloudletStatus) -> bool {
        use CloudletStatus::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Created, Failed)
                | (Submitted, InExec)
                | (Submitted, Failed)
                | (Submitted, Canceled)
                | (Submitted, Paused)
                | (InExec, Success)
                | (InExec, Failed)
                | (InExec, Canceled)
                | (InExec, Paused)
                | (Paused, InExec)
                | (Paused, Submitted)
                | (Paused, Canceled)
        )
    }
}

impl Display for CloudletStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CloudletStatus::Created => write!(f, "CREATED"),
            CloudletStatus::Submitted => write!(f, "SUBMITTED"),
            CloudletStatus::InExec => write!(f, "INEXEC"),
            CloudletStatus::Paused => write!(f, "PAUSED"),
            CloudletStatus::Success => write!(f, "SUCCESS"),
            CloudletStatus::Failed => write!(f, "FAILED"),
            CloudletStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Computational task with fixed length in million instructions (MI), executed on a VM.
#[derive(Clone, Debug, Serialize)]
pub struct Cloudlet {
    pub id: u32,
    /// Length in million instructions.
    pub length: u64,
    /// Number of PEs required.
    pub pes: u32,
    pub file_size: u64,
    pub output_size: u64,
    user_id: Option<Id>,
    vm_id: Option<u32>,
    datacenter_id: Option<Id>,
    status: CloudletStatus,
    exec_start_time: Option<f64>,
    finish_time: Option<f64>,
    actual_cpu_time: f64,
    failure: Option<CloudError>,
}

impl Cloudlet {
    pub fn new(id: u32, length: u64, pes: u32, file_size: u64, output_size: u64) -> Self {
        Self {
            id,
            length,
            pes,
            file_size,
            output_size,
            user_id: None,
            vm_id: None,
            datacenter_id: None,
            status: CloudletStatus::Created,
            exec_start_time: None,
            finish_time: None,
            actual_cpu_time: 0.,
            failure: None,
        }
    }

    pub fn status(&self) -> CloudletStatus {
        self.status
    }

    /// Returns ID of the broker owning the cloudlet.
    pub fn user_id(&self) -> Option<Id> {
        self.user_id
    }

    pub fn vm_id(&self) -> Option<u32> {
        self.vm_id
    }

    /// Returns ID of the datacenter which processed the cloudlet.
    pub fn datacenter_id(&self) -> Option<Id> {
        self.datacenter_id
    }

    pub fn exec_start_time(&self) -> Option<f64> {
        self.exec_start_time
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Returns the time between the start of execution and completion.
    pub fn actual_cpu_time(&self) -> f64 {
        self.actual_cpu_time
    }

    pub fn failure(&self) -> Option<&CloudError> {
        self.failure.as_ref()
    }

    pub fn set_user_id(&mut self, user_id: Id) {
        self.user_id = Some(user_id);
    }

    /// Binds the cloudlet to the VM. Rebinding is allowed only before the cloudlet is submitted.
    pub fn bind_to_vm(&mut self, vm_id: u32) -> Result<(), CloudError> {
        if self.status != CloudletStatus::Created {
            return Err(CloudError::InvalidAssignment {
                cloudlet_id: self.id,
                vm_id: Some(vm_id),
            });
        }
        self.vm_id = Some(vm_id);
        Ok(())
    }

    pub(crate) fn set_datacenter_id(&mut self, datacenter_id: Id) {
        self.datacenter_id = Some(datacenter_id);
    }

    /// Moves the cloudlet to the given status, returns false if the transition is not allowed.
    pub(crate) fn set_status(&mut self, status: CloudletStatus) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        true
    }

    pub(crate) fn start(&mut self, time: f64) -> bool {
        if !self.set_status(CloudletStatus::InExec) {
            return false;
        }
        // execution resumed after pause keeps the original start time
        if self.exec_start_time.is_none() {
            self.exec_start_time = Some(time);
        }
        true
    }

    pub(crate) fn complete(&mut self, time: f64) -> bool {
        if !self.set_status(CloudletStatus::Success) {
            return false;
        }
        self.finish_time = Some(time);
        self.actual_cpu_time = time - self.exec_start_time.unwrap_or(time);
        true
    }

    pub(crate) fn fail(&mut self, reason: CloudError) -> bool {
        if !self.set_status(CloudletStatus::Failed) {
            return false;
        }
        self.failure = Some(reason);
        true
    }

    pub(crate) fn cancel(&mut self, time: f64) -> bool {
        if !self.set_status(CloudletStatus::Canceled) {
            return false;
        }
        if let Some(start) = self.exec_start_time {
            self.actual_cpu_time = time - start;
        }
        true
    }
}
