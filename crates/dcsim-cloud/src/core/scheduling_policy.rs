//! Cloudlet to VM scheduling policies.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::core::cloudlet::Cloudlet;
use crate::core::config::{parse_config_value, parse_options};
use crate::core::error::CloudError;
use crate::core::vm::VmSpec;

/// Mapping from cloudlet ID to VM ID.
pub type Assignment = BTreeMap<u32, u32>;

/// Trait for implementation of cloudlet scheduling policies.
///
/// The policy maps each cloudlet to one of the VMs before the simulation starts. It returns
/// `InvalidConfiguration` if there are cloudlets but no VMs.
pub trait SchedulingPolicy {
    fn name(&self) -> String;
    fn assign(&mut self, cloudlets: &[Cloudlet], vms: &[VmSpec]) -> Result<Assignment, CloudError>;
}

/// Resolves policy from config string such as `RoundRobin` or `Random[seed=42]`.
///
/// `default_seed` is used by randomized policies if the seed is not set in options.
pub fn scheduling_policy_resolver(config_str: &str, default_seed: u64) -> Result<Box<dyn SchedulingPolicy>, CloudError> {
    let (policy_name, options) = parse_config_value(config_str);
    match policy_name.as_str() {
        "RoundRobin" => Ok(Box::new(RoundRobin::new())),
        "LeastLoaded" => Ok(Box::new(LeastLoaded::new())),
        "Random" => {
            let seed = match options.as_deref().map(parse_options) {
                Some(options) => match options.get("seed") {
                    Some(seed) => seed.parse::<u64>().map_err(|_| {
                        CloudError::InvalidConfiguration(format!("bad seed in scheduling policy: {}", config_str))
                    })?,
                    None => default_seed,
                },
                None => default_seed,
            };
            Ok(Box::new(Random::new(seed)))
        }
        _ => Err(CloudError::InvalidConfiguration(format!(
            "unknown scheduling policy: {}",
            config_str
        ))),
    }
}

fn check_vms(cloudlets: &[Cloudlet], vms: &[VmSpec]) -> Result<(), CloudError> {
    if vms.is_empty() && !cloudlets.is_empty() {
        return Err(CloudError::InvalidConfiguration(
            "cannot assign cloudlets to empty vm list".to_string(),
        ));
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////

/// Assigns i-th cloudlet to the VM with index `i mod M`.
#[derive(Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self {}
    }
}

impl SchedulingPolicy for RoundRobin {
    fn name(&self) -> String {
        "RoundRobin".to_string()
    }

    fn assign(&mut self, cloudlets: &[Cloudlet], vms: &[VmSpec]) -> Result<Assignment, CloudError> {
        check_vms(cloudlets, vms)?;
        Ok(cloudlets
            .iter()
            .enumerate()
            .map(|(i, cloudlet)| (cloudlet.id, vms[i % vms.len()].id))
            .collect())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Assigns each cloudlet to the VM which would complete its already assigned work earliest,
/// estimating completion as assigned MI divided by VM MIPS.
#[derive(Default)]
pub struct LeastLoaded;

impl LeastLoaded {
    pub fn new() -> Self {
        Self {}
    }
}

impl SchedulingPolicy for LeastLoaded {
    fn name(&self) -> String {
        "LeastLoaded".to_string()
    }

    fn assign(&mut self, cloudlets: &[Cloudlet], vms: &[VmSpec]) -> Result<Assignment, CloudError> {
        check_vms(cloudlets, vms)?;
        let mut load = vec![0.; vms.len()];
        let mut assignment = Assignment::new();
        for cloudlet in cloudlets {
            let work = cloudlet.length as f64 * cloudlet.pes as f64;
            let mut best = 0;
            let mut best_time = f64::MAX;
            for (idx, vm) in vms.iter().enumerate() {
                let time = (load[idx] + work) / vm.total_mips().max(f64::MIN_POSITIVE);
                if time < best_time {
                    best_time = time;
                    best = idx;
                }
            }
            load[best] += work;
            assignment.insert(cloudlet.id, vms[best].id);
        }
        Ok(assignment)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Assigns each cloudlet to a uniformly chosen VM, deterministic for a fixed seed.
pub struct Random {
    seed: u64,
    rand: Pcg64,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl SchedulingPolicy for Random {
    fn name(&self) -> String {
        format!("Random[seed={}]", self.seed)
    }

    fn assign(&mut self, cloudlets: &[Cloudlet], vms: &[VmSpec]) -> Result<Assignment, CloudError> {
        check_vms(cloudlets, vms)?;
        Ok(cloudlets
            .iter()
            .map(|cloudlet| (cloudlet.id, vms[self.rand.gen_range(0..vms.len())].id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cloudlet_scheduler::CloudletSchedulingPolicy;

    fn vms(mips: &[f64]) -> Vec<VmSpec> {
        mips.iter()
            .enumerate()
            .map(|(id, mips)| VmSpec::new(id as u32, *mips, 1, 512, 1000, 10000, CloudletSchedulingPolicy::TimeShared))
            .collect()
    }

    fn cloudlets(count: u32) -> Vec<Cloudlet> {
        (0..count).map(|id| Cloudlet::new(id, 400000, 1, 300, 300)).collect()
    }

    #[test]
    fn test_round_robin() {
        let assignment = RoundRobin::new().assign(&cloudlets(7), &vms(&[250., 250., 250.])).unwrap();
        for (cloudlet_id, vm_id) in assignment {
            assert_eq!(vm_id, cloudlet_id % 3);
        }
    }

    #[test]
    fn test_least_loaded_prefers_faster_vms() {
        let assignment = LeastLoaded::new().assign(&cloudlets(5), &vms(&[1000., 250.])).unwrap();
        let on_fast = assignment.values().filter(|vm_id| **vm_id == 0).count();
        assert_eq!(on_fast, 4);
        assert_eq!(assignment[&0], 0);
        assert_eq!(assignment[&4], 1);
    }

    #[test]
    fn test_random_is_deterministic() {
        let vms = vms(&[250.; 5]);
        let first = Random::new(42).assign(&cloudlets(20), &vms).unwrap();
        let second = Random::new(42).assign(&cloudlets(20), &vms).unwrap();
        assert_eq!(first, second);
        assert!(first.values().all(|vm_id| *vm_id < 5));
    }

    #[test]
    fn test_empty_vm_list() {
        assert!(matches!(
            RoundRobin::new().assign(&cloudlets(2), &[]),
            Err(CloudError::InvalidConfiguration(_))
        ));
        assert!(RoundRobin::new().assign(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_resolver() {
        assert_eq!(scheduling_policy_resolver("RoundRobin", 1).unwrap().name(), "RoundRobin");
        assert_eq!(scheduling_policy_resolver("Random[seed=7]", 1).unwrap().name(), "Random[seed=7]");
        assert_eq!(scheduling_policy_resolver("Random", 5).unwrap().name(), "Random[seed=5]");
        assert!(scheduling_policy_resolver("Magic", 1).is_err());
    }
}
