use approx::assert_relative_eq;

use dcsim_core::Id;

use dcsim_cloud::core::cloudlet::{Cloudlet, CloudletStatus};
use dcsim_cloud::core::cloudlet_scheduler::CloudletSchedulingPolicy;
use dcsim_cloud::core::config::SimulationConfig;
use dcsim_cloud::core::datacenter::DatacenterCharacteristics;
use dcsim_cloud::core::error::CloudError;
use dcsim_cloud::core::host::HostSpec;
use dcsim_cloud::core::vm::{VmSpec, VmStatus};
use dcsim_cloud::core::vm_allocation_policy::FirstFit;
use dcsim_cloud::core::vm_scheduler::VmSchedulingPolicy;
use dcsim_cloud::simulation::CloudSimulation;

fn host_spec() -> HostSpec {
    HostSpec {
        pes: 2,
        mips: 1000.,
        ram: 4096,
        bw: 10000,
        storage: 1000000,
        vm_scheduler: VmSchedulingPolicy::TimeShared,
    }
}

fn vm(id: u32) -> VmSpec {
    VmSpec::new(id, 250., 1, 512, 1000, 10000, CloudletSchedulingPolicy::TimeShared)
}

// Two users on a single host, both use VM 0 and cloudlet 0.
fn two_users() -> (CloudSimulation, Id, Id) {
    let mut cloud_sim = CloudSimulation::init(2, 0., SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    let mut brokers = Vec::new();
    for name in ["alice", "bob"] {
        let broker_id = cloud_sim.add_broker(name, dc).unwrap();
        cloud_sim.submit_guest_list(broker_id, vec![vm(0)]).unwrap();
        cloud_sim
            .submit_cloudlet_list(broker_id, vec![Cloudlet::new(0, 25000, 1, 300, 300)])
            .unwrap();
        cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 0).unwrap();
        brokers.push(broker_id);
    }
    (cloud_sim, brokers[0], brokers[1])
}

#[test]
fn test_users_with_same_vm_ids_get_separate_vms() {
    let (mut cloud_sim, alice, bob) = two_users();
    cloud_sim.start().unwrap();
    let datacenter = cloud_sim.datacenter(cloud_sim.datacenters()[0]).unwrap();
    let mut max_vms = 0usize;
    let mut max_ram = 0.;
    while cloud_sim.step() {
        let datacenter = datacenter.borrow();
        let host = datacenter.host(0).unwrap();
        max_vms = max_vms.max(host.vms().len());
        max_ram = f64::max(max_ram, host.ram().allocated());
    }
    assert_eq!(max_vms, 2);
    assert_relative_eq!(max_ram, 1024.);
    assert_relative_eq!(cloud_sim.current_time(), 100., epsilon = 1e-6);

    for broker_id in [alice, bob] {
        let broker = cloud_sim.broker(broker_id).unwrap();
        assert!(broker.borrow().is_finished());
        assert_eq!(broker.borrow().vm_status(0), Some(VmStatus::Destroyed));

        let reports = cloud_sim.cloudlet_reports(broker_id).unwrap();
        assert_eq!(reports[0].status, "SUCCESS");
        assert_relative_eq!(reports[0].finish_time.unwrap(), 100., epsilon = 1e-6);
    }

    let datacenter = datacenter.borrow();
    assert_eq!(datacenter.vm_count(), 0);
    assert!(datacenter.host(0).unwrap().vms().is_empty());
    assert_relative_eq!(datacenter.host(0).unwrap().ram().allocated(), 0.);
}

#[test]
fn test_control_events_affect_only_their_user() {
    let (mut cloud_sim, alice, bob) = two_users();
    cloud_sim.cancel_cloudlet(alice, 0, 50.).unwrap();
    cloud_sim.start_simulation().unwrap();

    let alice_broker = cloud_sim.broker(alice).unwrap();
    let alice_broker = alice_broker.borrow();
    let canceled = &alice_broker.cloudlet_received_list()[0];
    assert_eq!(canceled.status(), CloudletStatus::Canceled);
    assert_relative_eq!(canceled.actual_cpu_time(), 50., epsilon = 1e-6);

    let reports = cloud_sim.cloudlet_reports(bob).unwrap();
    assert_eq!(reports[0].status, "SUCCESS");
    assert_relative_eq!(reports[0].finish_time.unwrap(), 100., epsilon = 1e-6);
}

#[test]
fn test_destroying_vm_of_one_user_keeps_vm_of_another() {
    let (mut cloud_sim, alice, bob) = two_users();
    cloud_sim.destroy_vm(bob, 0, 40.).unwrap();
    cloud_sim.start().unwrap();
    cloud_sim.step_for_duration(60.);

    let datacenter = cloud_sim.datacenter(cloud_sim.datacenters()[0]).unwrap();
    assert_eq!(datacenter.borrow().vm_count(), 1);
    assert!(datacenter.borrow().vm(alice, 0).is_some());
    assert!(datacenter.borrow().vm(bob, 0).is_none());
    assert_eq!(
        cloud_sim.broker(bob).unwrap().borrow().vm_status(0),
        Some(VmStatus::Destroyed)
    );

    cloud_sim.step_until_no_events();
    let reports = cloud_sim.cloudlet_reports(alice).unwrap();
    assert_eq!(reports[0].status, "SUCCESS");
    assert_relative_eq!(reports[0].finish_time.unwrap(), 100., epsilon = 1e-6);
    let reports = cloud_sim.cloudlet_reports(bob).unwrap();
    assert_eq!(reports[0].status, "CANCELED");
}

#[test]
fn test_duplicate_component_names_are_rejected() {
    let mut cloud_sim = CloudSimulation::init(2, 0., SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    assert!(matches!(
        cloud_sim.add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new())),
        Err(CloudError::InvalidConfiguration(_))
    ));
    let broker_id = cloud_sim.add_broker("broker", dc).unwrap();
    assert!(matches!(
        cloud_sim.add_broker("broker", dc),
        Err(CloudError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        cloud_sim.add_broker("dc", dc),
        Err(CloudError::InvalidConfiguration(_))
    ));
    assert_eq!(cloud_sim.brokers(), vec![broker_id]);
    assert_eq!(cloud_sim.datacenters(), vec![dc]);
}

#[test]
fn test_duplicate_ids_of_one_user_are_rejected() {
    let mut cloud_sim = CloudSimulation::init(1, 0., SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    let broker_id = cloud_sim.add_broker("broker", dc).unwrap();
    cloud_sim.submit_guest_list(broker_id, vec![vm(0), vm(0)]).unwrap();
    cloud_sim
        .submit_cloudlet_list(broker_id, vec![Cloudlet::new(0, 1000, 1, 300, 300)])
        .unwrap();
    cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 0).unwrap();
    assert!(matches!(
        cloud_sim.start_simulation(),
        Err(CloudError::InvalidConfiguration(_))
    ));
    assert_eq!(cloud_sim.event_count(), 0);
}
