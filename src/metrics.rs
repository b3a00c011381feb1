use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetched_total", "Items parsed from sources.");
        describe_counter!("ingest_new_total", "Fetched items whose URL was not yet stored.");
        describe_counter!("ingest_accepted_total", "Items written to the store.");
        describe_counter!(
            "ingest_rejected_total",
            "Items dropped as off-topic in relevance-filter mode."
        );
        describe_counter!("ingest_provider_errors_total", "Source fetch/parse errors.");
        describe_counter!("ingest_runs_total", "Pipeline runs started, by trigger.");
        describe_counter!(
            "classify_errors_total",
            "Items left without a verdict because the classifier failed."
        );
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
