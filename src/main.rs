//! SEC Monitor service entrypoint.
//! Starts the pipeline scheduler and serves the JSON API next to it.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;

use sec_monitor::api::{self, AppState};
use sec_monitor::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use sec_monitor::metrics::Metrics;
use sec_monitor::{init_tracing, Monitor, MonitorConfig};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load_default()?;
    let monitor = Arc::new(Monitor::from_config(&cfg)?);

    spawn_scheduler(monitor.clone(), SchedulerCfg::from(cfg.schedule));

    let mut router = api::router(AppState { monitor });
    match Metrics::init() {
        Ok(metrics) => router = router.merge(metrics.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus recorder not installed"),
    }

    Ok(router.into())
}
