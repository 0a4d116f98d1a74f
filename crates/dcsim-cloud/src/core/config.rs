//! Simulation configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::cloudlet::Cloudlet;
use crate::core::cloudlet_scheduler::CloudletSchedulingPolicy;
use crate::core::datacenter::DatacenterCharacteristics;
use crate::core::error::CloudError;
use crate::core::host::HostSpec;
use crate::core::vm::VmSpec;
use crate::core::vm_scheduler::VmSchedulingPolicy;

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub seed: Option<u64>,
    pub message_delay: Option<f64>,
    pub min_update_delay: Option<f64>,
    pub datacenter: Option<DatacenterConfig>,
    pub hosts: Option<Vec<HostConfig>>,
    pub vms: Option<Vec<VmConfig>>,
    pub cloudlets: Option<Vec<CloudletConfig>>,
    pub scheduling_policy: Option<String>,
}

/// Holds configuration of datacenter.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DatacenterConfig {
    #[serde(default = "default_datacenter_name")]
    pub name: String,
    /// VM allocation policy, e.g. `FirstFit`.
    #[serde(default = "default_vm_allocation_policy")]
    pub vm_allocation_policy: String,
    #[serde(default)]
    pub characteristics: DatacenterCharacteristics,
}

impl Default for DatacenterConfig {
    fn default() -> Self {
        Self {
            name: default_datacenter_name(),
            vm_allocation_policy: default_vm_allocation_policy(),
            characteristics: DatacenterCharacteristics::default(),
        }
    }
}

fn default_datacenter_name() -> String {
    "datacenter".to_string()
}

fn default_vm_allocation_policy() -> String {
    "FirstFit".to_string()
}

/// Holds configuration of a single host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Number of PEs.
    pub pes: u32,
    /// MIPS of each PE.
    pub mips: f64,
    /// RAM capacity in MB.
    pub ram: u64,
    pub bw: u64,
    /// Storage capacity in MB.
    pub storage: u64,
    pub vm_scheduler: Option<VmSchedulingPolicy>,
    /// Number of such hosts.
    pub count: Option<u32>,
}

/// Holds configuration of a single VM or a set of identical VMs.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmConfig {
    /// MIPS of each virtual PE.
    pub mips: f64,
    pub pes: u32,
    /// RAM in MB.
    pub ram: u64,
    pub bw: u64,
    /// Image size in MB.
    pub size: u64,
    pub vmm: Option<String>,
    pub cloudlet_scheduler: Option<CloudletSchedulingPolicy>,
    /// Number of such VMs.
    pub count: Option<u32>,
}

/// Holds configuration of a single cloudlet or a set of identical cloudlets.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct CloudletConfig {
    /// Length in MI.
    pub length: u64,
    pub pes: u32,
    pub file_size: Option<u64>,
    pub output_size: Option<u64>,
    /// Number of such cloudlets.
    pub count: Option<u32>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Seed of simulation random number generator.
    pub seed: u64,
    /// Delay in seconds of messages between broker and datacenter.
    pub message_delay: f64,
    /// Minimal delay in seconds between two processing updates of datacenter.
    pub min_update_delay: f64,
    pub datacenter: DatacenterConfig,
    /// Configurations of hosts of the datacenter.
    pub hosts: Vec<HostConfig>,
    /// Configurations of VMs requested by the broker.
    pub vms: Vec<VmConfig>,
    /// Configurations of cloudlets submitted by the broker.
    pub cloudlets: Vec<CloudletConfig>,
    /// Cloudlet to VM scheduling policy, e.g. `RoundRobin`.
    pub scheduling_policy: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, CloudError> {
        let data = std::fs::read_to_string(file_name)
            .map_err(|e| CloudError::InvalidConfiguration(format!("can't read file {}: {}", file_name, e)))?;
        Self::from_yaml(&data)
    }

    /// Creates simulation config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, CloudError> {
        let raw: RawSimulationConfig = serde_yaml::from_str(data)
            .map_err(|e| CloudError::InvalidConfiguration(format!("can't parse YAML: {}", e)))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSimulationConfig) -> Self {
        Self {
            seed: raw.seed.unwrap_or(123),
            message_delay: raw.message_delay.unwrap_or(0.),
            min_update_delay: raw.min_update_delay.unwrap_or(0.01),
            datacenter: raw.datacenter.unwrap_or_default(),
            hosts: raw.hosts.unwrap_or_default(),
            vms: raw.vms.unwrap_or_default(),
            cloudlets: raw.cloudlets.unwrap_or_default(),
            scheduling_policy: raw.scheduling_policy.unwrap_or_else(|| "RoundRobin".to_string()),
        }
    }

    /// Expands host configurations into host specs.
    pub fn host_specs(&self) -> Vec<HostSpec> {
        let mut specs = Vec::new();
        for host in self.hosts.iter() {
            for _ in 0..host.count.unwrap_or(1) {
                specs.push(HostSpec {
                    pes: host.pes,
                    mips: host.mips,
                    ram: host.ram,
                    bw: host.bw,
                    storage: host.storage,
                    vm_scheduler: host.vm_scheduler.unwrap_or_default(),
                });
            }
        }
        specs
    }

    /// Expands VM configurations into VM specs with sequential IDs starting from zero.
    pub fn vm_specs(&self) -> Vec<VmSpec> {
        let mut specs = Vec::new();
        for vm in self.vms.iter() {
            for _ in 0..vm.count.unwrap_or(1) {
                let mut spec = VmSpec::new(
                    specs.len() as u32,
                    vm.mips,
                    vm.pes,
                    vm.ram,
                    vm.bw,
                    vm.size,
                    vm.cloudlet_scheduler.unwrap_or_default(),
                );
                if let Some(vmm) = &vm.vmm {
                    spec.vmm = vmm.clone();
                }
                specs.push(spec);
            }
        }
        specs
    }

    /// Expands cloudlet configurations into cloudlets with sequential IDs starting from zero.
    pub fn cloudlets(&self) -> Vec<Cloudlet> {
        let mut cloudlets = Vec::new();
        for cloudlet in self.cloudlets.iter() {
            for _ in 0..cloudlet.count.unwrap_or(1) {
                cloudlets.push(Cloudlet::new(
                    cloudlets.len() as u32,
                    cloudlet.length,
                    cloudlet.pes,
                    cloudlet.file_size.unwrap_or(300),
                    cloudlet.output_size.unwrap_or(300),
                ));
            }
        }
        cloudlets
    }
}

/// Parses config value string, which consists of two parts - name and options.
///
/// Example: `LeastLoaded[seed=1]` parses to `LeastLoaded` name and `seed=1` options string.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_value() {
        assert_eq!(parse_config_value("RoundRobin"), ("RoundRobin".to_string(), None));
        assert_eq!(
            parse_config_value("Random[seed=42]"),
            ("Random".to_string(), Some("seed=42".to_string()))
        );
        let options = parse_options("seed=42,other=x");
        assert_eq!(options.get("seed").unwrap(), "42");
        assert_eq!(options.get("other").unwrap(), "x");
        assert_eq!(options.get("missing"), None);
    }

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::from_yaml("hosts:\n  - { pes: 2, mips: 1000, ram: 4096, bw: 10000, storage: 1000000 }\n")
            .unwrap();
        assert_eq!(config.seed, 123);
        assert_eq!(config.message_delay, 0.);
        assert_eq!(config.datacenter.vm_allocation_policy, "FirstFit");
        assert_eq!(config.scheduling_policy, "RoundRobin");
        assert_eq!(config.host_specs().len(), 1);
        assert_eq!(config.host_specs()[0].vm_scheduler, VmSchedulingPolicy::TimeShared);
        assert!(config.vm_specs().is_empty());
    }

    #[test]
    fn test_counts_expand_with_sequential_ids() {
        let config = SimulationConfig::from_yaml(
            r#"
vms:
  - { count: 2, mips: 250, pes: 1, ram: 512, bw: 1000, size: 10000 }
  - { mips: 500, pes: 2, ram: 1024, bw: 1000, size: 10000, cloudlet_scheduler: SpaceShared }
cloudlets:
  - { count: 4, length: 1000, pes: 1 }
"#,
        )
        .unwrap();
        let vms = config.vm_specs();
        assert_eq!(vms.iter().map(|vm| vm.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(vms[2].cloudlet_scheduler, CloudletSchedulingPolicy::SpaceShared);
        let cloudlets = config.cloudlets();
        assert_eq!(cloudlets.len(), 4);
        assert_eq!(cloudlets[3].id, 3);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            SimulationConfig::from_yaml("hosts: 5"),
            Err(CloudError::InvalidConfiguration(_))
        ));
    }
}
