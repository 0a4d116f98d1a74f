//! Simulation control surface: building datacenters and brokers, running and stopping the simulation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use dcsim_core::context::SimulationContext;
use dcsim_core::simulation::Simulation;
use dcsim_core::{log_info, log_warn, Id};

use crate::core::broker::Broker;
use crate::core::cloudlet::Cloudlet;
use crate::core::config::SimulationConfig;
use crate::core::datacenter::{Datacenter, DatacenterCharacteristics};
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{CloudletCancel, CloudletPause, CloudletResume};
use crate::core::events::vm::VmDestroyRequest;
use crate::core::host::{Host, HostSpec};
use crate::core::report::{cloudlet_reports, CloudletReport, RunSummary};
use crate::core::scheduling_policy::{scheduling_policy_resolver, Assignment, SchedulingPolicy};
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::{vm_allocation_policy_resolver, VmAllocationPolicy};

pub struct CloudSimulation {
    num_users: u32,
    datacenters: BTreeMap<Id, Rc<RefCell<Datacenter>>>,
    brokers: BTreeMap<Id, Rc<RefCell<Broker>>>,
    started: bool,
    stopped: bool,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl CloudSimulation {
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Self {
        let ctx = sim.create_context("simulation");
        Self {
            num_users: 0,
            datacenters: BTreeMap::new(),
            brokers: BTreeMap::new(),
            started: false,
            stopped: false,
            sim,
            ctx,
            sim_config: rc!(sim_config),
        }
    }

    /// Creates simulation for the given number of users with the clock starting at `start_time`.
    pub fn init(num_users: u32, start_time: f64, sim_config: SimulationConfig) -> Self {
        let sim = Simulation::with_start_time(sim_config.seed, start_time);
        let mut cloud_sim = Self::new(sim, sim_config);
        cloud_sim.num_users = num_users;
        cloud_sim
    }

    /// Builds simulation with one datacenter and one broker from config.
    ///
    /// Cloudlets are assigned to VMs by the configured scheduling policy.
    pub fn from_config(sim_config: SimulationConfig) -> Result<Self, CloudError> {
        let mut cloud_sim = Self::init(1, 0., sim_config.clone());
        let policy = vm_allocation_policy_resolver(&sim_config.datacenter.vm_allocation_policy)?;
        let datacenter_id = cloud_sim.add_datacenter(
            &sim_config.datacenter.name,
            sim_config.datacenter.characteristics.clone(),
            &sim_config.host_specs(),
            policy,
        )?;
        let broker_id = cloud_sim.add_broker("broker", datacenter_id)?;
        cloud_sim.submit_guest_list(broker_id, sim_config.vm_specs())?;
        cloud_sim.submit_cloudlet_list(broker_id, sim_config.cloudlets())?;
        let mut scheduling_policy = scheduling_policy_resolver(&sim_config.scheduling_policy, sim_config.seed)?;
        cloud_sim.assign_cloudlets(broker_id, scheduling_policy.as_mut())?;
        Ok(cloud_sim)
    }

    /// Creates datacenter with hosts built from the given specs.
    ///
    /// Datacenter without hosts or with a name used by another component is rejected.
    pub fn add_datacenter(
        &mut self,
        name: &str,
        characteristics: DatacenterCharacteristics,
        host_specs: &[HostSpec],
        vm_allocation_policy: Box<dyn VmAllocationPolicy>,
    ) -> Result<Id, CloudError> {
        self.check_unique_name(name)?;
        if host_specs.is_empty() {
            return Err(CloudError::InvalidConfiguration(format!(
                "datacenter {} has no hosts",
                name
            )));
        }
        let hosts = host_specs
            .iter()
            .enumerate()
            .map(|(id, spec)| Host::new(id as u32, spec))
            .collect();
        let datacenter = rc!(refcell!(Datacenter::new(
            characteristics,
            hosts,
            vm_allocation_policy,
            self.sim.create_context(name),
            self.sim_config.clone(),
        )));
        let id = self.sim.add_handler(name, datacenter.clone());
        self.datacenters.insert(id, datacenter);
        log_info!(self.ctx, "datacenter {} with {} hosts added", name, host_specs.len());
        Ok(id)
    }

    /// Creates broker sending its requests to the given datacenter.
    pub fn add_broker(&mut self, name: &str, datacenter_id: Id) -> Result<Id, CloudError> {
        if !self.datacenters.contains_key(&datacenter_id) {
            return Err(CloudError::InvalidConfiguration(format!(
                "unknown datacenter {} for broker {}",
                datacenter_id, name
            )));
        }
        self.check_unique_name(name)?;
        let broker = rc!(refcell!(Broker::new(self.sim.create_context(name), self.sim_config.clone())));
        let id = self.sim.add_handler(name, broker.clone());
        broker.borrow_mut().set_datacenter(datacenter_id);
        self.brokers.insert(id, broker);
        Ok(id)
    }

    pub fn broker(&self, broker_id: Id) -> Option<Rc<RefCell<Broker>>> {
        self.brokers.get(&broker_id).cloned()
    }

    pub fn datacenter(&self, datacenter_id: Id) -> Option<Rc<RefCell<Datacenter>>> {
        self.datacenters.get(&datacenter_id).cloned()
    }

    pub fn brokers(&self) -> Vec<Id> {
        self.brokers.keys().copied().collect()
    }

    pub fn datacenters(&self) -> Vec<Id> {
        self.datacenters.keys().copied().collect()
    }

    pub fn submit_guest_list(&mut self, broker_id: Id, vms: Vec<VmSpec>) -> Result<(), CloudError> {
        self.get_broker(broker_id)?.borrow_mut().submit_guest_list(vms);
        Ok(())
    }

    pub fn submit_cloudlet_list(&mut self, broker_id: Id, cloudlets: Vec<Cloudlet>) -> Result<(), CloudError> {
        self.get_broker(broker_id)?.borrow_mut().submit_cloudlet_list(cloudlets);
        Ok(())
    }

    pub fn bind_cloudlet_to_vm(&mut self, broker_id: Id, cloudlet_id: u32, vm_id: u32) -> Result<(), CloudError> {
        self.get_broker(broker_id)?
            .borrow_mut()
            .bind_cloudlet_to_vm(cloudlet_id, vm_id)
    }

    /// Computes assignment of broker's cloudlets with the policy and binds cloudlets accordingly.
    pub fn assign_cloudlets(
        &mut self,
        broker_id: Id,
        policy: &mut dyn SchedulingPolicy,
    ) -> Result<Assignment, CloudError> {
        let broker = self.get_broker(broker_id)?;
        let assignment = {
            let broker = broker.borrow();
            policy.assign(broker.cloudlet_list(), broker.vm_list())?
        };
        broker.borrow_mut().apply_assignment(&assignment)?;
        log_info!(
            self.ctx,
            "{} cloudlets assigned by {} policy",
            assignment.len(),
            policy.name()
        );
        Ok(assignment)
    }

    /// Requests cancellation of the broker's cloudlet after the given delay.
    pub fn cancel_cloudlet(&mut self, broker_id: Id, cloudlet_id: u32, delay: f64) -> Result<(), CloudError> {
        let datacenter_id = self.datacenter_of(broker_id)?;
        self.ctx
            .emit_as(CloudletCancel { cloudlet_id }, broker_id, datacenter_id, delay);
        Ok(())
    }

    pub fn pause_cloudlet(&mut self, broker_id: Id, cloudlet_id: u32, delay: f64) -> Result<(), CloudError> {
        let datacenter_id = self.datacenter_of(broker_id)?;
        self.ctx
            .emit_as(CloudletPause { cloudlet_id }, broker_id, datacenter_id, delay);
        Ok(())
    }

    pub fn resume_cloudlet(&mut self, broker_id: Id, cloudlet_id: u32, delay: f64) -> Result<(), CloudError> {
        let datacenter_id = self.datacenter_of(broker_id)?;
        self.ctx
            .emit_as(CloudletResume { cloudlet_id }, broker_id, datacenter_id, delay);
        Ok(())
    }

    /// Requests destruction of the broker's VM after the given delay. Its unfinished cloudlets are canceled.
    pub fn destroy_vm(&mut self, broker_id: Id, vm_id: u32, delay: f64) -> Result<(), CloudError> {
        let datacenter_id = self.datacenter_of(broker_id)?;
        self.ctx
            .emit_as(VmDestroyRequest { vm_id }, broker_id, datacenter_id, delay);
        Ok(())
    }

    /// Validates the setup and starts all brokers without running the event loop.
    pub fn start(&mut self) -> Result<(), CloudError> {
        if self.started {
            return Ok(());
        }
        if self.datacenters.is_empty() {
            return Err(CloudError::InvalidConfiguration("no datacenters".to_string()));
        }
        if self.num_users > 0 && self.brokers.len() as u32 != self.num_users {
            log_warn!(
                self.ctx,
                "expected {} users, but {} brokers are created",
                self.num_users,
                self.brokers.len()
            );
        }
        for broker in self.brokers.values() {
            broker.borrow().validate()?;
        }
        for broker in self.brokers.values() {
            broker.borrow_mut().start();
        }
        self.started = true;
        Ok(())
    }

    /// Runs the simulation until there are no more events and returns the final simulation time.
    ///
    /// Setup errors are returned before any event is processed.
    pub fn start_simulation(&mut self) -> Result<f64, CloudError> {
        self.start()?;
        log_info!(self.ctx, "simulation started");
        self.sim.step_until_no_events();
        log_info!(self.ctx, "simulation finished");
        Ok(self.sim.time())
    }

    /// Stops the simulation by discarding all pending events. Calling it again has no effect.
    pub fn stop_simulation(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.sim.cancel_events(|_| true);
        log_info!(self.ctx, "simulation stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Performs the specified number of steps through the simulation.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Performs one step through the simulation.
    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Steps through the simulation for the given duration.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.sim.step_for_duration(duration)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events()
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }

    /// Returns reports for the cloudlets received by the broker, ordered by cloudlet ID.
    pub fn cloudlet_reports(&self, broker_id: Id) -> Result<Vec<CloudletReport>, CloudError> {
        let broker = self.get_broker(broker_id)?;
        let datacenter = self.get_datacenter(self.datacenter_of(broker_id)?)?;
        let broker = broker.borrow();
        let datacenter = datacenter.borrow();
        Ok(cloudlet_reports(
            broker.cloudlet_received_list(),
            datacenter.characteristics(),
        ))
    }

    /// Summarizes results of the broker.
    pub fn run_summary(&self, broker_id: Id, policy: &str) -> Result<RunSummary, CloudError> {
        let broker = self.get_broker(broker_id)?;
        let datacenter = self.get_datacenter(self.datacenter_of(broker_id)?)?;
        let broker = broker.borrow();
        let datacenter = datacenter.borrow();
        Ok(RunSummary::new(
            policy,
            broker.cloudlet_received_list(),
            datacenter.characteristics(),
        ))
    }

    fn get_broker(&self, broker_id: Id) -> Result<Rc<RefCell<Broker>>, CloudError> {
        self.broker(broker_id)
            .ok_or_else(|| CloudError::InvalidConfiguration(format!("unknown broker {}", broker_id)))
    }

    fn get_datacenter(&self, datacenter_id: Id) -> Result<Rc<RefCell<Datacenter>>, CloudError> {
        self.datacenter(datacenter_id)
            .ok_or_else(|| CloudError::InvalidConfiguration(format!("unknown datacenter {}", datacenter_id)))
    }

    // Components are registered by name, so a repeated name would alias an existing component.
    fn check_unique_name(&self, name: &str) -> Result<(), CloudError> {
        match self.sim.component_id(name) {
            Some(id) => Err(CloudError::InvalidConfiguration(format!(
                "name {} is already taken by component {}",
                name, id
            ))),
            None => Ok(()),
        }
    }

    fn datacenter_of(&self, broker_id: Id) -> Result<Id, CloudError> {
        self.get_broker(broker_id)?
            .borrow()
            .datacenter_id()
            .ok_or_else(|| CloudError::InvalidConfiguration(format!("broker {} has no datacenter", broker_id)))
    }
}
