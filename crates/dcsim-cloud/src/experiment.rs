//! Tools for comparing scheduling policies on the same scenario.

use std::fs::File;
use std::sync::{Arc, Mutex};

use indexmap::map::IndexMap;
use threadpool::ThreadPool;

use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::core::report::RunSummary;
use crate::simulation::CloudSimulation;

/// Runs one scenario under several scheduling policies.
///
/// Each run owns its own simulation and is executed in a separate thread of the pool.
pub struct PolicyComparison {
    pub config: SimulationConfig,
    pub policies: Vec<String>,
}

impl PolicyComparison {
    pub fn new(config: SimulationConfig, policies: Vec<String>) -> Self {
        Self { config, policies }
    }

    /// Runs the comparison using the specified number of threads, returns summaries in the order of policies.
    pub fn run(&self, num_threads: usize) -> Result<IndexMap<String, RunSummary>, CloudError> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(num_threads.max(1));

        for (run_id, policy) in self.policies.iter().enumerate() {
            let mut config = self.config.clone();
            config.scheduling_policy = policy.clone();
            let policy = policy.clone();
            let results = results.clone();

            pool.execute(move || {
                let summary = run_simulation(config, &policy);
                if let Ok(mut results) = results.lock() {
                    results.push((run_id, policy, summary));
                }
            });
        }

        pool.join();
        let mut runs = match results.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if runs.len() != self.policies.len() {
            return Err(CloudError::InvalidConfiguration(format!(
                "{} of {} runs did not complete",
                self.policies.len() - runs.len(),
                self.policies.len()
            )));
        }
        runs.sort_by_key(|(run_id, _, _)| *run_id);

        let mut summaries = IndexMap::new();
        for (_, policy, summary) in runs {
            summaries.insert(policy, summary?);
        }
        Ok(summaries)
    }
}

/// Saves summaries to JSON file.
pub fn save_json(summaries: &IndexMap<String, RunSummary>, path: &str) -> Result<(), std::io::Error> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, summaries)?;
    Ok(())
}

fn run_simulation(config: SimulationConfig, policy: &str) -> Result<RunSummary, CloudError> {
    let mut cloud_sim = CloudSimulation::from_config(config)?;
    cloud_sim.start_simulation()?;
    let broker_id = cloud_sim
        .brokers()
        .first()
        .copied()
        .ok_or_else(|| CloudError::InvalidConfiguration("no brokers".to_string()))?;
    cloud_sim.run_summary(broker_id, policy)
}
