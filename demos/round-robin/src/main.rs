use std::process;

use clap::Parser;
use log::{error, info};

use dcsim_cloud::core::config::SimulationConfig;
use dcsim_cloud::core::error::CloudError;
use dcsim_cloud::core::report::save_csv;
use dcsim_cloud::experiment::{save_json, PolicyComparison};
use dcsim_cloud::simulation::CloudSimulation;

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to simulation config
    #[clap(short, long, default_value = "config.yaml")]
    config: String,

    /// Scheduling policy overriding the one from config, e.g. RoundRobin or Random[seed=1]
    #[clap(short, long)]
    policy: Option<String>,

    /// Path to CSV file with cloudlet reports (or JSON file with summaries in comparison mode)
    #[clap(short, long)]
    output: Option<String>,

    /// Comma-separated list of policies to compare
    #[clap(long)]
    compare: Option<String>,

    /// Number of threads used in comparison mode
    #[clap(short, long, default_value_t = 4)]
    threads: usize,
}

fn run_single(config: SimulationConfig, output: Option<String>) -> Result<(), CloudError> {
    let policy = config.scheduling_policy.clone();
    let mut cloud_sim = CloudSimulation::from_config(config)?;
    let end_time = cloud_sim.start_simulation()?;
    let broker_id = cloud_sim.brokers()[0];
    let reports = cloud_sim.cloudlet_reports(broker_id)?;

    println!("========== OUTPUT ({}) ==========", policy);
    println!(
        "{:>10} {:>10} {:>12} {:>6} {:>10} {:>12} {:>12} {:>10}",
        "Cloudlet", "Status", "Datacenter", "VM", "Time", "Start", "Finish", "Cost"
    );
    let fmt_time = |t: Option<f64>| t.map_or("-".to_string(), |t| format!("{:.2}", t));
    for report in reports.iter() {
        println!(
            "{:>10} {:>10} {:>12} {:>6} {:>10.2} {:>12} {:>12} {:>10.2}",
            report.cloudlet_id,
            report.status,
            report.datacenter_id.map_or("-".to_string(), |id| id.to_string()),
            report.vm_id.map_or("-".to_string(), |id| id.to_string()),
            report.cpu_time,
            fmt_time(report.start_time),
            fmt_time(report.finish_time),
            report.cost,
        );
    }
    info!("Simulation finished at {:.2}, processed {} events", end_time, cloud_sim.event_count());

    if let Some(path) = output {
        if let Err(e) = save_csv(&reports, &path) {
            error!("Can't save reports to {}: {}", path, e);
        }
    }
    Ok(())
}

fn run_comparison(config: SimulationConfig, policies: &str, threads: usize, output: Option<String>) -> Result<(), CloudError> {
    let policies = policies
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let comparison = PolicyComparison::new(config, policies);
    let summaries = comparison.run(threads)?;

    println!(
        "{:>20} {:>10} {:>10} {:>10} {:>12} {:>12}",
        "Policy", "Succeeded", "Failed", "Canceled", "Makespan", "Cost"
    );
    for summary in summaries.values() {
        println!(
            "{:>20} {:>10} {:>10} {:>10} {:>12.2} {:>12.2}",
            summary.policy, summary.succeeded, summary.failed, summary.canceled, summary.makespan, summary.total_cost
        );
    }

    if let Some(path) = output {
        if let Err(e) = save_json(&summaries, &path) {
            error!("Can't save summaries to {}: {}", path, e);
        }
    }
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();

    let mut config = match SimulationConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if let Some(policy) = args.policy {
        config.scheduling_policy = policy;
    }

    let result = match args.compare {
        Some(policies) => run_comparison(config, &policies, args.threads, args.output),
        None => run_single(config, args.output),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
