// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ScheduleConfig;
use crate::pipeline::{Monitor, RunError};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub run_on_startup_if_empty: bool,
}

impl From<ScheduleConfig> for SchedulerCfg {
    fn from(c: ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(c.interval_hours.max(1) * 3600),
            run_on_startup_if_empty: c.run_on_startup_if_empty,
        }
    }
}

async fn tick(monitor: &Monitor, trigger: &'static str) {
    match monitor.run_as(trigger).await {
        Ok(report) => tracing::info!(
            target: "ingest",
            trigger,
            new = report.new,
            accepted = report.accepted,
            "scheduled run finished"
        ),
        Err(RunError::AlreadyRunning) => {
            tracing::info!(target: "ingest", trigger, "skipping tick; a run is already in progress")
        }
        Err(e) => tracing::error!(target: "ingest", trigger, error = %e, "scheduled run failed"),
    }
}

/// Spawn the interval trigger. The first run happens at startup only while
/// the store is empty; afterwards once per `interval`.
pub fn spawn_scheduler(monitor: Arc<Monitor>, cfg: SchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let empty = monitor.with_store(|s| s.count() == 0);
        if cfg.run_on_startup_if_empty && empty {
            tracing::info!(target: "ingest", "store empty; running initial fetch");
            tick(&monitor, "startup").await;
        } else {
            tracing::info!(target: "ingest", "store populated; skipping initial fetch");
        }

        let start = tokio::time::Instant::now() + cfg.interval;
        let mut ticker = tokio::time::interval_at(start, cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            target: "ingest",
            every_secs = cfg.interval.as_secs(),
            "pipeline scheduled"
        );
        loop {
            ticker.tick().await;
            tick(&monitor, "interval").await;
        }
    })
}
