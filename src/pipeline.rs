// src/pipeline.rs
//! Orchestrator: fetch → dedupe → classify → store, once per invocation.
//!
//! A run never fails because of one source or one item. The only errors a
//! caller sees are "another run is in flight" and a store that cannot be
//! read or locked before fetching starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::Classifier;
use crate::config::MonitorConfig;
use crate::ingest::dedup::partition_new;
use crate::ingest::http::build_client;
use crate::ingest::providers::{EventsPageFetcher, FeedFetcher};
use crate::ingest::types::SourceFetcher;
use crate::ingest::{fetch_all, SourceReport};
use crate::store::{JsonStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Fetching,
    Deduping,
    Classifying,
    Storing,
    Done,
}

/// Summary of one run, produced on reaching `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub new: usize,
    pub accepted: usize,
    /// Off-topic rejections; only reported in relevance-filter mode.
    pub rejected: Option<usize>,
    pub store_errors: usize,
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Monitor {
    fetchers: Vec<Box<dyn SourceFetcher>>,
    classifier: Classifier,
    store: Mutex<JsonStore>,
    running: AtomicBool,
    phase: Mutex<RunPhase>,
    last_report: Mutex<Option<RunReport>>,
}

/// Clears the in-process flag and resets the phase however the run ends.
struct Flight<'a>(&'a Monitor);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.set_phase(RunPhase::Idle);
        self.0.running.store(false, Ordering::Release);
    }
}

impl Monitor {
    pub fn new(fetchers: Vec<Box<dyn SourceFetcher>>, classifier: Classifier, store: JsonStore) -> Self {
        Self {
            fetchers,
            classifier,
            store: Mutex::new(store),
            running: AtomicBool::new(false),
            phase: Mutex::new(RunPhase::Idle),
            last_report: Mutex::new(None),
        }
    }

    /// Wire fetchers, classifier and store from configuration.
    pub fn from_config(cfg: &MonitorConfig) -> anyhow::Result<Self> {
        let client = build_client(&cfg.http)?;

        let mut fetchers: Vec<Box<dyn SourceFetcher>> = cfg
            .feeds
            .iter()
            .map(|f| {
                Box::new(FeedFetcher::from_url(f.source.clone(), &f.url, client.clone()))
                    as Box<dyn SourceFetcher>
            })
            .collect();
        if let Some(page) = cfg.active_page() {
            fetchers.push(Box::new(EventsPageFetcher::from_url(
                page.source.clone(),
                &page.url,
                client.clone(),
            )));
        }

        let classifier = Classifier::from_config(&cfg.classifier, &cfg.http.user_agent)?;
        let store = JsonStore::open(&cfg.store.path)?;
        info!(
            sources = fetchers.len(),
            store = %cfg.store.path.display(),
            stored = store.count(),
            "monitor ready"
        );
        Ok(Self::new(fetchers, classifier, store))
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().expect("phase mutex poisoned")
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report
            .lock()
            .expect("report mutex poisoned")
            .clone()
    }

    /// Read access to the store for the dashboard and exports.
    pub fn with_store<R>(&self, f: impl FnOnce(&JsonStore) -> R) -> R {
        let guard = self.store.lock().expect("store mutex poisoned");
        f(&guard)
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().expect("phase mutex poisoned") = phase;
        tracing::debug!(?phase, "pipeline phase");
    }

    /// Execute one run on demand. Single-flight: a concurrent call gets `AlreadyRunning`.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.run_as("manual").await
    }

    /// Same as [`Monitor::run`], counted under `trigger` in `ingest_runs_total`.
    pub async fn run_as(&self, trigger: &'static str) -> Result<RunReport, RunError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("pipeline run requested while another run is in progress");
            return Err(RunError::AlreadyRunning);
        }
        let _flight = Flight(self);
        let started_at = Utc::now();

        let (_lock, known_urls) = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            let lock = store.try_lock().map_err(|e| match e {
                StoreError::Locked { .. } => RunError::AlreadyRunning,
                other => RunError::Store(other),
            })?;
            // Another process may have written since the last run.
            store.reload()?;
            (lock, store.urls())
        };
        counter!("ingest_runs_total", "trigger" => trigger).increment(1);
        info!(trigger, "pipeline run started");

        self.set_phase(RunPhase::Fetching);
        let (fetched_items, sources) = fetch_all(&self.fetchers).await;
        let fetched = fetched_items.len();

        self.set_phase(RunPhase::Deduping);
        let partition = partition_new(&known_urls, fetched_items);
        let new = partition.fresh.len();
        info!(fetched, new, already_seen = partition.seen.len(), "dedup complete");

        self.set_phase(RunPhase::Classifying);
        let classified = self.classifier.classify_all(partition.fresh).await;

        self.set_phase(RunPhase::Storing);
        let mut rejected = 0usize;
        let mut admitted = Vec::with_capacity(classified.len());
        for item in classified {
            if self.classifier.admits(&item.verdict) {
                admitted.push(item);
            } else {
                rejected += 1;
                tracing::debug!(url = %item.url, "rejected as off-topic");
            }
        }
        let attempted = admitted.len();
        // One write for the whole batch keeps the store mutex hold short.
        let outcome = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .insert_all(admitted);
        let (accepted, store_errors) = match outcome {
            Ok(saved) => {
                for it in &saved {
                    info!(url = %it.url, title = %truncate(&it.title, 70), "saved");
                }
                (saved.len(), 0)
            }
            Err(e) => {
                warn!(items = attempted, error = %e, "failed to persist new items");
                (0, attempted)
            }
        };

        let finished_at = Utc::now();
        if let Err(e) = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .mark_run(finished_at)
        {
            warn!(error = %e, "failed to record last run time");
        }

        counter!("ingest_new_total").increment(new as u64);
        counter!("ingest_accepted_total").increment(accepted as u64);
        counter!("ingest_rejected_total").increment(rejected as u64);
        gauge!("ingest_pipeline_last_run_ts").set(finished_at.timestamp() as f64);

        let report = RunReport {
            started_at,
            finished_at,
            fetched,
            new,
            accepted,
            rejected: self.classifier.filters().then_some(rejected),
            store_errors,
            sources,
        };
        self.set_phase(RunPhase::Done);
        info!(
            fetched = report.fetched,
            new = report.new,
            accepted = report.accepted,
            rejected = ?report.rejected,
            failed_sources = report.sources.iter().filter(|s| s.error.is_some()).count(),
            "pipeline run done"
        );
        *self.last_report.lock().expect("report mutex poisoned") = Some(report.clone());
        Ok(report)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
