//! Runs the pipeline a single time and prints the report as JSON.
//! Meant for cron jobs and CI schedules; exits 0 even when sources failed.

use sec_monitor::{init_tracing, Monitor, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load_default()?;
    let monitor = Monitor::from_config(&cfg)?;
    let report = monitor.run_as("once").await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
