// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{Classifier, ClassifyMode, Verdict};
pub use crate::api::router;
pub use crate::config::MonitorConfig;
pub use crate::ingest::types::{FetchError, Item, Source, SourceFetcher};
pub use crate::pipeline::{Monitor, RunError, RunPhase, RunReport};
pub use crate::store::{JsonStore, StoreError};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber.
/// `RUST_LOG` drives the filter; `MONITOR_LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once: later calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sec_monitor=info,warn"));

    let json = std::env::var("MONITOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
