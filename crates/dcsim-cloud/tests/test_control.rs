use approx::assert_relative_eq;

use dcsim_core::simulation::Simulation;

use dcsim_cloud::core::cloudlet::{Cloudlet, CloudletStatus};
use dcsim_cloud::core::cloudlet_scheduler::CloudletSchedulingPolicy;
use dcsim_cloud::core::config::SimulationConfig;
use dcsim_cloud::core::datacenter::DatacenterCharacteristics;
use dcsim_cloud::core::error::CloudError;
use dcsim_cloud::core::host::HostSpec;
use dcsim_cloud::core::scheduling_policy::RoundRobin;
use dcsim_cloud::core::vm::{VmSpec, VmStatus};
use dcsim_cloud::core::vm_allocation_policy::FirstFit;
use dcsim_cloud::core::vm_scheduler::VmSchedulingPolicy;
use dcsim_cloud::simulation::CloudSimulation;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn scenario_c() -> (CloudSimulation, u32) {
    let config = SimulationConfig::from_file(&name_wrapper("scenario_c.yaml")).unwrap();
    let cloud_sim = CloudSimulation::from_config(config).unwrap();
    let broker_id = cloud_sim.brokers()[0];
    (cloud_sim, broker_id)
}

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

#[test]
// Cloudlet 1 runs at 250 MIPS until cloudlet 0 is canceled at 100, then at 500 MIPS:
// 100000 - 25000 = 75000 MI remain, which take 150 more seconds.
fn test_cancel_cloudlet() {
    let (mut cloud_sim, broker_id) = scenario_c();
    cloud_sim.cancel_cloudlet(broker_id, 0, 100.).unwrap();
    // cancellation after completion has no effect
    cloud_sim.cancel_cloudlet(broker_id, 1, 1000.).unwrap();
    cloud_sim.start_simulation().unwrap();

    let broker = cloud_sim.broker(broker_id).unwrap();
    let broker = broker.borrow();
    let received = broker.cloudlet_received_list();
    assert_eq!(received.len(), 2);

    assert_eq!(received[0].id, 0);
    assert_eq!(received[0].status(), CloudletStatus::Canceled);
    assert!(received[0].finish_time().is_none());
    assert_relative_eq!(received[0].actual_cpu_time(), 100., epsilon = 1e-6);

    assert_eq!(received[1].id, 1);
    assert_eq!(received[1].status(), CloudletStatus::Success);
    assert_relative_eq!(received[1].finish_time().unwrap(), 250., epsilon = 1e-6);
}

#[test]
// Cloudlet 0 is paused during [100, 200] and keeps its progress.
fn test_pause_and_resume_cloudlet() {
    let (mut cloud_sim, broker_id) = scenario_c();
    cloud_sim.pause_cloudlet(broker_id, 0, 100.).unwrap();
    cloud_sim.resume_cloudlet(broker_id, 0, 200.).unwrap();
    cloud_sim.start_simulation().unwrap();

    let reports = cloud_sim.cloudlet_reports(broker_id).unwrap();
    assert_eq!(reports[0].status, "SUCCESS");
    assert_relative_eq!(reports[0].start_time.unwrap(), 0.);
    assert_relative_eq!(reports[0].finish_time.unwrap(), 400., epsilon = 1e-6);
    assert_eq!(reports[1].status, "SUCCESS");
    assert_relative_eq!(reports[1].finish_time.unwrap(), 300., epsilon = 1e-6);
}

#[test]
fn test_destroy_vm_cancels_its_cloudlets() {
    let (mut cloud_sim, broker_id) = scenario_c();
    cloud_sim.destroy_vm(broker_id, 0, 100.).unwrap();
    let end_time = cloud_sim.start_simulation().unwrap();
    assert_relative_eq!(end_time, 100.);

    let broker = cloud_sim.broker(broker_id).unwrap();
    assert!(broker.borrow().is_finished());
    assert_eq!(broker.borrow().vm_status(0), Some(VmStatus::Destroyed));
    for cloudlet in broker.borrow().cloudlet_received_list() {
        assert_eq!(cloudlet.status(), CloudletStatus::Canceled);
    }

    let datacenter = cloud_sim.datacenter(cloud_sim.datacenters()[0]).unwrap();
    assert_eq!(datacenter.borrow().vm_count(), 0);
    assert!(!datacenter.borrow().has_pending_update());
}

#[test]
fn test_stop_simulation() {
    let (mut cloud_sim, _) = scenario_c();
    cloud_sim.start().unwrap();
    assert!(cloud_sim.step_for_duration(10.));
    cloud_sim.stop_simulation();
    cloud_sim.stop_simulation();
    assert!(cloud_sim.is_stopped());
    assert!(!cloud_sim.step());
    assert_relative_eq!(cloud_sim.current_time(), 0.);
}

#[test]
fn test_start_time() {
    let mut cloud_sim = CloudSimulation::init(1, 50., SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    let broker_id = cloud_sim.add_broker("broker", dc).unwrap();
    cloud_sim.submit_guest_list(broker_id, vec![vm(0)]).unwrap();
    cloud_sim
        .submit_cloudlet_list(broker_id, vec![Cloudlet::new(0, 25000, 1, 300, 300)])
        .unwrap();
    cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 0).unwrap();
    cloud_sim.start_simulation().unwrap();

    let reports = cloud_sim.cloudlet_reports(broker_id).unwrap();
    assert_relative_eq!(reports[0].start_time.unwrap(), 50.);
    assert_relative_eq!(reports[0].finish_time.unwrap(), 150., epsilon = 1e-6);
}

#[test]
fn test_datacenter_without_hosts_is_rejected() {
    let mut cloud_sim = CloudSimulation::new(Simulation::new(123), SimulationConfig::default());
    let result = cloud_sim.add_datacenter("dc", DatacenterCharacteristics::default(), &[], Box::new(FirstFit::new()));
    assert!(matches!(result, Err(CloudError::InvalidConfiguration(_))));
    assert!(matches!(
        cloud_sim.start_simulation(),
        Err(CloudError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_cloudlets_without_vms_are_rejected() {
    let mut cloud_sim = CloudSimulation::new(Simulation::new(123), SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    let broker_id = cloud_sim.add_broker("broker", dc).unwrap();
    cloud_sim
        .submit_cloudlet_list(broker_id, vec![Cloudlet::new(0, 1000, 1, 300, 300)])
        .unwrap();

    assert!(matches!(
        cloud_sim.assign_cloudlets(broker_id, &mut RoundRobin::new()),
        Err(CloudError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        cloud_sim.start_simulation(),
        Err(CloudError::InvalidConfiguration(_))
    ));
    assert_eq!(cloud_sim.event_count(), 0);
}

#[test]
fn test_invalid_assignments() {
    let mut cloud_sim = CloudSimulation::new(Simulation::new(123), SimulationConfig::default());
    let dc = cloud_sim
        .add_datacenter("dc", DatacenterCharacteristics::default(), &[host_spec()], Box::new(FirstFit::new()))
        .unwrap();
    assert!(cloud_sim.add_broker("broker", dc + 100).is_err());
    let broker_id = cloud_sim.add_broker("broker", dc).unwrap();
    cloud_sim.submit_guest_list(broker_id, vec![vm(0), vm(1)]).unwrap();
    cloud_sim
        .submit_cloudlet_list(
            broker_id,
            vec![Cloudlet::new(0, 1000, 1, 300, 300), Cloudlet::new(1, 1000, 1, 300, 300)],
        )
        .unwrap();

    assert_eq!(
        cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 5),
        Err(CloudError::InvalidAssignment {
            cloudlet_id: 0,
            vm_id: Some(5)
        })
    );
    assert_eq!(
        cloud_sim.bind_cloudlet_to_vm(broker_id, 7, 0),
        Err(CloudError::InvalidAssignment {
            cloudlet_id: 7,
            vm_id: Some(0)
        })
    );

    // cloudlet 1 is left unbound
    cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 1).unwrap();
    assert_eq!(
        cloud_sim.start_simulation(),
        Err(CloudError::InvalidAssignment {
            cloudlet_id: 1,
            vm_id: None
        })
    );

    let assignment = cloud_sim.assign_cloudlets(broker_id, &mut RoundRobin::new()).unwrap();
    assert_eq!(assignment[&0], 0);
    assert_eq!(assignment[&1], 1);
    cloud_sim.start_simulation().unwrap();

    // binding after dispatch is not allowed
    assert!(cloud_sim.bind_cloudlet_to_vm(broker_id, 0, 1).is_err());
    let reports = cloud_sim.cloudlet_reports(broker_id).unwrap();
    assert!(reports.iter().all(|r| r.status == "SUCCESS"));
}
