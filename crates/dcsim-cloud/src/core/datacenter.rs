//! Datacenter component processing VM and cloudlet requests.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use dcsim_core::cast;
use dcsim_core::context::SimulationContext;
use dcsim_core::event::{Event, EventId};
use dcsim_core::handler::EventHandler;
use dcsim_core::{log_debug, log_trace, log_warn, Id};

use crate::core::cloudlet::Cloudlet;
use crate::core::common::OwnedId;
use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{CloudletCancel, CloudletPause, CloudletResume, CloudletReturn, CloudletSubmit};
use crate::core::events::datacenter::UpdateProcessing;
use crate::core::events::vm::{VmCreateFailed, VmCreateRequest, VmCreated, VmDestroyRequest, VmDestroyed};
use crate::core::host::Host;
use crate::core::vm::{Vm, VmSpec};
use crate::core::vm_allocation_policy::{VmAllocationPolicy, VmAllocator};

/// Static description of datacenter together with its usage prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatacenterCharacteristics {
    pub arch: String,
    pub os: String,
    pub vmm: String,
    pub time_zone: f64,
    /// Price of one second of cloudlet processing.
    pub cost_per_sec: f64,
    pub cost_per_mem: f64,
    pub cost_per_storage: f64,
    pub cost_per_bw: f64,
}

impl Default for DatacenterCharacteristics {
    fn default() -> Self {
        Self {
            arch: "x86".to_string(),
            os: "Linux".to_string(),
            vmm: "Xen".to_string(),
            time_zone: 10.,
            cost_per_sec: 3.,
            cost_per_mem: 0.05,
            cost_per_storage: 0.001,
            cost_per_bw: 0.,
        }
    }
}

impl DatacenterCharacteristics {
    /// Returns the cost of processing during the given CPU time.
    pub fn processing_cost(&self, cpu_time: f64) -> f64 {
        cpu_time * self.cost_per_sec
    }
}

/// Datacenter owning hosts and running VMs with their cloudlets.
///
/// Before any change of its state the datacenter brings execution of all cloudlets up to the current time,
/// after the change it keeps exactly one pending [`UpdateProcessing`] event at the earliest predicted
/// cloudlet completion.
///
/// VMs and cloudlets are keyed by their owner and ID, so users may pick the same IDs. Requests concerning
/// an existing VM or cloudlet are matched against the sender of the request.
pub struct Datacenter {
    characteristics: DatacenterCharacteristics,
    allocator: VmAllocator,
    vms: BTreeMap<OwnedId, Vm>,
    cloudlet_vms: BTreeMap<OwnedId, u32>,
    next_update: Option<EventId>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Datacenter {
    pub fn new(
        characteristics: DatacenterCharacteristics,
        hosts: Vec<Host>,
        vm_allocation_policy: Box<dyn VmAllocationPolicy>,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        Self {
            characteristics,
            allocator: VmAllocator::new(vm_allocation_policy, hosts),
            vms: BTreeMap::new(),
            cloudlet_vms: BTreeMap::new(),
            next_update: None,
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

    pub fn characteristics(&self) -> &DatacenterCharacteristics {
        &self.characteristics
    }

    pub fn hosts(&self) -> &BTreeMap<u32, Host> {
        self.allocator.hosts()
    }

    pub fn host(&self, host_id: u32) -> Option<&Host> {
        self.allocator.host(host_id)
    }

    /// Returns the running VM of the given owner.
    pub fn vm(&self, owner: Id, vm_id: u32) -> Option<&Vm> {
        self.vms.get(&(owner, vm_id))
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Returns true if a processing update event is pending.
    pub fn has_pending_update(&self) -> bool {
        self.next_update.is_some()
    }

    fn on_vm_create_request(&mut self, vm: VmSpec, requester: Id) {
        self.update_cloudlet_processing();
        let vm_id = vm.id;
        match self.allocator.allocate_host_for_vm(requester, &vm) {
            Ok(placement) => {
                log_debug!(self.ctx, "vm #{} created on host #{}", vm_id, placement.host_id);
                self.vms
                    .insert((requester, vm_id), Vm::new(vm, placement.host_id, self.ctx.time()));
                self.ctx.emit(
                    VmCreated {
                        vm_id,
                        host_id: placement.host_id,
                    },
                    requester,
                    self.sim_config.message_delay,
                );
            }
            Err(reason) => {
                log_warn!(self.ctx, "failed to create vm #{}: {}", vm_id, reason);
                self.ctx
                    .emit(VmCreateFailed { vm_id, reason }, requester, self.sim_config.message_delay);
            }
        }
        self.process_cloudlets();
    }

    fn on_vm_destroy_request(&mut self, vm_id: u32, requester: Id) {
        self.update_cloudlet_processing();
        if let Some(mut vm) = self.vms.remove(&(requester, vm_id)) {
            let time = self.ctx.time();
            for cloudlet in vm.cloudlet_scheduler.take_finished() {
                self.return_cloudlet(cloudlet);
            }
            for cloudlet in vm.cloudlet_scheduler.cancel_all(time) {
                log_debug!(self.ctx, "cloudlet #{} canceled with vm #{}", cloudlet.id, vm_id);
                self.return_cloudlet(cloudlet);
            }
            if let Some(host_id) = self.allocator.deallocate_host_for_vm(requester, vm_id) {
                log_debug!(self.ctx, "vm #{} destroyed on host #{}", vm_id, host_id);
                self.ctx
                    .emit(VmDestroyed { vm_id, host_id }, requester, self.sim_config.message_delay);
            }
        }
        self.process_cloudlets();
    }

    fn on_cloudlet_submit(&mut self, mut cloudlet: Cloudlet, owner: Id) {
        self.update_cloudlet_processing();
        cloudlet.set_datacenter_id(self.ctx.id());
        cloudlet.set_user_id(owner);
        let time = self.ctx.time();
        match cloudlet.vm_id().and_then(|vm_id| self.vms.get_mut(&(owner, vm_id))) {
            Some(vm) => {
                let (cloudlet_id, vm_id) = (cloudlet.id, vm.id());
                match vm.cloudlet_scheduler.submit(cloudlet, time) {
                    Ok(()) => {
                        log_trace!(self.ctx, "cloudlet #{} submitted to vm #{}", cloudlet_id, vm_id);
                        self.cloudlet_vms.insert((owner, cloudlet_id), vm_id);
                    }
                    Err(e) => {
                        log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet_id, e);
                    }
                }
            }
            None => {
                // the VM failed to be created or was already destroyed
                let reason = CloudError::InsufficientVmCapacity {
                    cloudlet_id: cloudlet.id,
                    vm_id: cloudlet.vm_id(),
                };
                log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet.id, reason);
                cloudlet.fail(reason);
                self.return_cloudlet(cloudlet);
            }
        }
        self.process_cloudlets();
    }

    fn on_cloudlet_cancel(&mut self, cloudlet_id: u32, owner: Id) {
        self.update_cloudlet_processing();
        let time = self.ctx.time();
        let canceled = self
            .cloudlet_vm(owner, cloudlet_id)
            .and_then(|vm| vm.cloudlet_scheduler.cancel(cloudlet_id, time));
        match canceled {
            Some(cloudlet) => {
                log_debug!(self.ctx, "cloudlet #{} canceled", cloudlet_id);
                self.return_cloudlet(cloudlet);
            }
            None => {
                log_trace!(self.ctx, "cloudlet #{} is not active, cancel ignored", cloudlet_id);
            }
        }
        self.process_cloudlets();
    }

    fn on_cloudlet_pause(&mut self, cloudlet_id: u32, owner: Id) {
        self.update_cloudlet_processing();
        if let Some(vm) = self.cloudlet_vm(owner, cloudlet_id) {
            if vm.cloudlet_scheduler.pause(cloudlet_id) {
                log_debug!(self.ctx, "cloudlet #{} paused", cloudlet_id);
            }
        }
        self.process_cloudlets();
    }

    fn on_cloudlet_resume(&mut self, cloudlet_id: u32, owner: Id) {
        self.update_cloudlet_processing();
        let time = self.ctx.time();
        if let Some(vm) = self.cloudlet_vm(owner, cloudlet_id) {
            if vm.cloudlet_scheduler.resume(cloudlet_id, time) {
                log_debug!(self.ctx, "cloudlet #{} resumed", cloudlet_id);
            }
        }
        self.process_cloudlets();
    }

    fn cloudlet_vm(&mut self, owner: Id, cloudlet_id: u32) -> Option<&mut Vm> {
        let vm_id = *self.cloudlet_vms.get(&(owner, cloudlet_id))?;
        self.vms.get_mut(&(owner, vm_id))
    }

    fn on_update_processing(&mut self) {
        self.next_update = None;
        self.process_cloudlets();
    }

    // Advances all VMs to the current time and returns the earliest predicted cloudlet completion.
    fn update_cloudlet_processing(&mut self) -> Option<f64> {
        let time = self.ctx.time();
        let mut next: Option<f64> = None;
        for ((owner, vm_id), vm) in self.vms.iter_mut() {
            let share = self.allocator.mips_share(*owner, *vm_id);
            if let Some(t) = vm.cloudlet_scheduler.update_processing(time, &share) {
                next = Some(next.map_or(t, |n: f64| n.min(t)));
            }
        }
        next
    }

    fn process_cloudlets(&mut self) {
        let next = self.update_cloudlet_processing();
        let mut finished = Vec::new();
        for vm in self.vms.values_mut() {
            finished.extend(vm.cloudlet_scheduler.take_finished());
        }
        for cloudlet in finished {
            log_debug!(self.ctx, "cloudlet #{} finished with status {}", cloudlet.id, cloudlet.status());
            self.return_cloudlet(cloudlet);
        }
        self.schedule_update(next);
    }

    fn schedule_update(&mut self, next: Option<f64>) {
        if let Some(event_id) = self.next_update.take() {
            self.ctx.cancel_event(event_id);
        }
        if let Some(time) = next {
            let delay = (time - self.ctx.time()).max(self.sim_config.min_update_delay);
            self.next_update = Some(self.ctx.emit_self(UpdateProcessing {}, delay));
        }
    }

    fn return_cloudlet(&mut self, cloudlet: Cloudlet) {
        match cloudlet.user_id() {
            Some(user_id) => {
                self.cloudlet_vms.remove(&(user_id, cloudlet.id));
                self.ctx
                    .emit(CloudletReturn { cloudlet }, user_id, self.sim_config.message_delay);
            }
            None => {
                log_warn!(self.ctx, "cloudlet #{} has no owner and is dropped", cloudlet.id);
            }
        }
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmCreateRequest { vm } => {
                self.on_vm_create_request(vm, event.src);
            }
            VmDestroyRequest { vm_id } => {
                self.on_vm_destroy_request(vm_id, event.src);
            }
            CloudletSubmit { cloudlet } => {
                self.on_cloudlet_submit(cloudlet, event.src);
            }
            CloudletCancel { cloudlet_id } => {
                self.on_cloudlet_cancel(cloudlet_id, event.src);
            }
            CloudletPause { cloudlet_id } => {
                self.on_cloudlet_pause(cloudlet_id, event.src);
            }
            CloudletResume { cloudlet_id } => {
                self.on_cloudlet_resume(cloudlet_id, event.src);
            }
            UpdateProcessing {} => {
                self.on_update_processing();
            }
        })
    }
}
