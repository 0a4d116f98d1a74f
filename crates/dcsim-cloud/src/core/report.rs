//! Per-cloudlet execution results and run summaries.

use std::fs::File;

use serde::Serialize;

use dcsim_core::Id;

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::datacenter::DatacenterCharacteristics;

/// Execution statistics of a single cloudlet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CloudletReport {
    pub cloudlet_id: u32,
    pub status: String,
    pub datacenter_id: Option<Id>,
    pub vm_id: Option<u32>,
    pub cpu_time: f64,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
    pub cost: f64,
    pub failure: Option<String>,
}

impl CloudletReport {
    pub fn new(cloudlet: &Cloudlet, characteristics: &DatacenterCharacteristics) -> Self {
        Self {
            cloudlet_id: cloudlet.id,
            status: cloudlet.status().to_string(),
            datacenter_id: cloudlet.datacenter_id(),
            vm_id: cloudlet.vm_id(),
            cpu_time: cloudlet.actual_cpu_time(),
            start_time: cloudlet.exec_start_time(),
            finish_time: cloudlet.finish_time(),
            cost: characteristics.processing_cost(cloudlet.actual_cpu_time()),
            failure: cloudlet.failure().map(|e| e.to_string()),
        }
    }
}

/// Builds reports for the received cloudlets, ordered by cloudlet ID.
pub fn cloudlet_reports(cloudlets: &[Cloudlet], characteristics: &DatacenterCharacteristics) -> Vec<CloudletReport> {
    let mut reports: Vec<CloudletReport> = cloudlets
        .iter()
        .map(|cloudlet| CloudletReport::new(cloudlet, characteristics))
        .collect();
    reports.sort_by_key(|report| report.cloudlet_id);
    reports
}

/// Saves reports to CSV file.
pub fn save_csv(reports: &[CloudletReport], path: &str) -> Result<(), std::io::Error> {
    let file = File::create(path)?;
    let mut wtr = csv::Writer::from_writer(file);
    for report in reports {
        wtr.serialize(report)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Aggregated results of one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub policy: String,
    pub cloudlets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Latest finish time among succeeded cloudlets.
    pub makespan: f64,
    pub mean_cpu_time: f64,
    pub total_cost: f64,
}

impl RunSummary {
    pub fn new(policy: &str, cloudlets: &[Cloudlet], characteristics: &DatacenterCharacteristics) -> Self {
        let count = |status: CloudletStatus| cloudlets.iter().filter(|c| c.status() == status).count();
        let succeeded: Vec<&Cloudlet> = cloudlets
            .iter()
            .filter(|c| c.status() == CloudletStatus::Success)
            .collect();
        let makespan = succeeded
            .iter()
            .filter_map(|c| c.finish_time())
            .fold(0., f64::max);
        let mean_cpu_time = if succeeded.is_empty() {
            0.
        } else {
            succeeded.iter().map(|c| c.actual_cpu_time()).sum::<f64>() / succeeded.len() as f64
        };
        Self {
            policy: policy.to_string(),
            cloudlets: cloudlets.len(),
            succeeded: succeeded.len(),
            failed: count(CloudletStatus::Failed),
            canceled: count(CloudletStatus::Canceled),
            makespan,
            mean_cpu_time,
            total_cost: cloudlets
                .iter()
                .map(|c| characteristics.processing_cost(c.actual_cpu_time()))
                .sum(),
        }
    }
}
