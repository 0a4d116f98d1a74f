//! Broker component acting on behalf of a simulated user.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use dcsim_core::cast;
use dcsim_core::context::SimulationContext;
use dcsim_core::event::Event;
use dcsim_core::handler::EventHandler;
use dcsim_core::{log_debug, log_info, log_warn, Id};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::core::events::broker::BrokerStart;
use crate::core::events::cloudlet::{CloudletReturn, CloudletSubmit};
use crate::core::events::vm::{VmCreateFailed, VmCreateRequest, VmCreated, VmDestroyRequest, VmDestroyed};
use crate::core::scheduling_policy::Assignment;
use crate::core::vm::{VmSpec, VmStatus};

/// Submits VMs and cloudlets of a user to datacenter and collects the results.
///
/// On start the broker requests creation of all its VMs and waits for every acknowledgement. Then it dispatches
/// cloudlets in submission order and, once all of them are returned, destroys its VMs.
pub struct Broker {
    datacenter_id: Option<Id>,
    vms: Vec<VmSpec>,
    vm_statuses: BTreeMap<u32, VmStatus>,
    vm_hosts: BTreeMap<u32, u32>,
    cloudlets: Vec<Cloudlet>,
    received: Vec<Cloudlet>,
    pending_vm_acks: usize,
    outstanding_cloudlets: usize,
    started: bool,
    dispatched: bool,
    finished: bool,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Broker {
    pub fn new(ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        Self {
            datacenter_id: None,
            vms: Vec::new(),
            vm_statuses: BTreeMap::new(),
            vm_hosts: BTreeMap::new(),
            cloudlets: Vec::new(),
            received: Vec::new(),
            pending_vm_acks: 0,
            outstanding_cloudlets: 0,
            started: false,
            dispatched: false,
            finished: false,
            ctx,
            sim_config,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Sets datacenter receiving the requests of this broker.
    pub fn set_datacenter(&mut self, datacenter_id: Id) {
        self.datacenter_id = Some(datacenter_id);
    }

    pub fn datacenter_id(&self) -> Option<Id> {
        self.datacenter_id
    }

    /// Adds VMs to be created on start.
    pub fn submit_guest_list(&mut self, vms: Vec<VmSpec>) {
        for mut vm in vms {
            vm.user_id = Some(self.ctx.id());
            self.vm_statuses.insert(vm.id, VmStatus::Pending);
            self.vms.push(vm);
        }
    }

    /// Adds cloudlets to be dispatched once VMs are created.
    pub fn submit_cloudlet_list(&mut self, cloudlets: Vec<Cloudlet>) {
        for mut cloudlet in cloudlets {
            cloudlet.set_user_id(self.ctx.id());
            self.cloudlets.push(cloudlet);
        }
    }

    /// Binds a not yet dispatched cloudlet to one of the broker's VMs.
    pub fn bind_cloudlet_to_vm(&mut self, cloudlet_id: u32, vm_id: u32) -> Result<(), CloudError> {
        let invalid = CloudError::InvalidAssignment {
            cloudlet_id,
            vm_id: Some(vm_id),
        };
        if !self.vm_statuses.contains_key(&vm_id) {
            return Err(invalid);
        }
        match self.cloudlets.iter_mut().find(|c| c.id == cloudlet_id) {
            Some(cloudlet) => cloudlet.bind_to_vm(vm_id),
            None => Err(invalid),
        }
    }

    /// Binds cloudlets according to the assignment. Nothing is changed if some entry is invalid.
    pub fn apply_assignment(&mut self, assignment: &Assignment) -> Result<(), CloudError> {
        for (cloudlet_id, vm_id) in assignment.iter() {
            let known_cloudlet = self
                .cloudlets
                .iter()
                .any(|c| c.id == *cloudlet_id && c.status() == CloudletStatus::Created);
            if !known_cloudlet || !self.vm_statuses.contains_key(vm_id) {
                return Err(CloudError::InvalidAssignment {
                    cloudlet_id: *cloudlet_id,
                    vm_id: Some(*vm_id),
                });
            }
        }
        for (cloudlet_id, vm_id) in assignment.iter() {
            self.bind_cloudlet_to_vm(*cloudlet_id, *vm_id)?;
        }
        Ok(())
    }

    /// Checks that the broker can be started.
    pub fn validate(&self) -> Result<(), CloudError> {
        if self.datacenter_id.is_none() {
            return Err(CloudError::InvalidConfiguration(format!(
                "broker {} has no datacenter",
                self.ctx.name()
            )));
        }
        if self.vms.is_empty() && !self.cloudlets.is_empty() {
            return Err(CloudError::InvalidConfiguration(format!(
                "broker {} has cloudlets but no vms",
                self.ctx.name()
            )));
        }
        if self.vm_statuses.len() != self.vms.len() {
            return Err(CloudError::InvalidConfiguration(format!(
                "broker {} has vms with duplicate ids",
                self.ctx.name()
            )));
        }
        let mut cloudlet_ids = BTreeSet::new();
        for cloudlet in self.cloudlets.iter() {
            if !cloudlet_ids.insert(cloudlet.id) {
                return Err(CloudError::InvalidConfiguration(format!(
                    "broker {} has duplicate cloudlet #{}",
                    self.ctx.name(),
                    cloudlet.id
                )));
            }
            match cloudlet.vm_id() {
                Some(vm_id) if self.vm_statuses.contains_key(&vm_id) => {}
                vm_id => {
                    return Err(CloudError::InvalidAssignment {
                        cloudlet_id: cloudlet.id,
                        vm_id,
                    })
                }
            }
        }
        Ok(())
    }

    /// Schedules the broker start at the current simulation time.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.ctx.emit_self_now(BrokerStart {});
        }
    }

    pub fn vm_list(&self) -> &[VmSpec] {
        &self.vms
    }

    /// Returns cloudlets which are not dispatched yet.
    pub fn cloudlet_list(&self) -> &[Cloudlet] {
        &self.cloudlets
    }

    /// Returns cloudlets returned from datacenter in the order of their arrival.
    pub fn cloudlet_received_list(&self) -> &[Cloudlet] {
        &self.received
    }

    pub fn vm_status(&self, vm_id: u32) -> Option<VmStatus> {
        self.vm_statuses.get(&vm_id).copied()
    }

    pub fn vm_statuses(&self) -> &BTreeMap<u32, VmStatus> {
        &self.vm_statuses
    }

    pub fn vm_host(&self, vm_id: u32) -> Option<u32> {
        self.vm_hosts.get(&vm_id).copied()
    }

    /// Returns true once all dispatched cloudlets have reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn on_start(&mut self) {
        let datacenter_id = match self.datacenter_id {
            Some(id) => id,
            None => {
                log_warn!(self.ctx, "no datacenter is set, nothing to do");
                return;
            }
        };
        log_info!(self.ctx, "started with {} vms and {} cloudlets", self.vms.len(), self.cloudlets.len());
        self.pending_vm_acks = self.vms.len();
        for vm in self.vms.iter() {
            self.ctx
                .emit(VmCreateRequest { vm: vm.clone() }, datacenter_id, self.sim_config.message_delay);
        }
        if self.pending_vm_acks == 0 {
            self.dispatch_cloudlets();
        }
    }

    fn on_vm_created(&mut self, vm_id: u32, host_id: u32) {
        log_debug!(self.ctx, "vm #{} is running on host #{}", vm_id, host_id);
        self.vm_statuses.insert(vm_id, VmStatus::Running);
        self.vm_hosts.insert(vm_id, host_id);
        self.on_vm_ack();
    }

    fn on_vm_create_failed(&mut self, vm_id: u32, reason: CloudError) {
        log_warn!(self.ctx, "vm #{} is not created: {}", vm_id, reason);
        self.vm_statuses.insert(vm_id, VmStatus::FailedToAllocate);
        self.on_vm_ack();
    }

    fn on_vm_ack(&mut self) {
        self.pending_vm_acks = self.pending_vm_acks.saturating_sub(1);
        if self.pending_vm_acks == 0 && !self.dispatched {
            self.dispatch_cloudlets();
        }
    }

    fn dispatch_cloudlets(&mut self) {
        self.dispatched = true;
        let datacenter_id = match self.datacenter_id {
            Some(id) => id,
            None => return,
        };
        for mut cloudlet in std::mem::take(&mut self.cloudlets) {
            cloudlet.set_status(CloudletStatus::Submitted);
            self.outstanding_cloudlets += 1;
            self.ctx
                .emit(CloudletSubmit { cloudlet }, datacenter_id, self.sim_config.message_delay);
        }
        log_debug!(self.ctx, "dispatched {} cloudlets", self.outstanding_cloudlets);
        if self.outstanding_cloudlets == 0 {
            self.finish();
        }
    }

    fn on_cloudlet_return(&mut self, cloudlet: Cloudlet) {
        log_debug!(self.ctx, "cloudlet #{} returned with status {}", cloudlet.id, cloudlet.status());
        self.received.push(cloudlet);
        self.outstanding_cloudlets = self.outstanding_cloudlets.saturating_sub(1);
        if self.outstanding_cloudlets == 0 && self.dispatched && !self.finished {
            self.finish();
        }
    }

    fn on_vm_destroyed(&mut self, vm_id: u32, host_id: u32) {
        log_debug!(self.ctx, "vm #{} destroyed on host #{}", vm_id, host_id);
        self.vm_statuses.insert(vm_id, VmStatus::Destroyed);
    }

    fn finish(&mut self) {
        self.finished = true;
        log_info!(self.ctx, "all {} cloudlets are returned", self.received.len());
        if let Some(datacenter_id) = self.datacenter_id {
            for (vm_id, status) in self.vm_statuses.iter() {
                if *status == VmStatus::Running {
                    self.ctx.emit(
                        VmDestroyRequest { vm_id: *vm_id },
                        datacenter_id,
                        self.sim_config.message_delay,
                    );
                }
            }
        }
    }
}

impl EventHandler for Broker {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            BrokerStart {} => {
                self.on_start();
            }
            VmCreated { vm_id, host_id } => {
                self.on_vm_created(vm_id, host_id);
            }
            VmCreateFailed { vm_id, reason } => {
                self.on_vm_create_failed(vm_id, reason);
            }
            CloudletReturn { cloudlet } => {
                self.on_cloudlet_return(cloudlet);
            }
            VmDestroyed { vm_id, host_id } => {
                self.on_vm_destroyed(vm_id, host_id);
            }
        })
    }
}
