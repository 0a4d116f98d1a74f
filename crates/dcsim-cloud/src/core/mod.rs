//! Datacenter model: resources, virtual machines, tasks and the components managing them.

pub mod broker;
pub mod cloudlet;
pub mod cloudlet_scheduler;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod error;
pub mod events;
pub mod host;
pub mod pe;
pub mod provisioner;
pub mod report;
pub mod scheduling_policy;
pub mod vm;
pub mod vm_allocation_policy;
pub mod vm_scheduler;
