//! Read-only JSON view over the store plus the manual trigger.
//!
//! This is the surface the dashboard and the static generator consume; they
//! only ever see the typed verdict fields, never raw classifier output.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::ingest::types::{Item, Source};
use crate::pipeline::{Monitor, RunError, RunPhase, RunReport};
use crate::store::StoreStats;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/items", get(list_items))
        .route("/api/stats", get(stats))
        .route("/api/run", post(run_now))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// One item as shown on the dashboard.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemOut {
    pub source: String,
    pub source_label: String,
    pub title: String,
    pub url: String,
    pub published: Option<String>,
    pub summary: String,
    pub ai_score: Option<u8>,
    pub ai_relevant: Option<bool>,
    pub ai_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Item> for ItemOut {
    fn from(it: Item) -> Self {
        Self {
            source_label: it.source.label().to_string(),
            source: it.source.to_string(),
            ai_score: it.verdict.score(),
            ai_relevant: it.verdict.is_relevant(),
            ai_reason: it.verdict.reason().map(str::to_string),
            published: (!it.published.is_empty()).then_some(it.published),
            title: it.title,
            url: it.url,
            summary: it.summary,
            created_at: it.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemsQuery {
    source: Option<String>,
    limit: Option<usize>,
}

async fn list_items(State(state): State<AppState>, Query(q): Query<ItemsQuery>) -> Json<Vec<ItemOut>> {
    let items = state.monitor.with_store(|s| match &q.source {
        Some(src) => s.list_by_source(&Source::from(src.as_str())),
        None => s.list_all(),
    });
    let limit = q.limit.unwrap_or(usize::MAX);
    Json(items.into_iter().take(limit).map(ItemOut::from).collect())
}

#[derive(Debug, Serialize)]
struct StatsOut {
    #[serde(flatten)]
    store: StoreStats,
    running: bool,
    phase: RunPhase,
    last_report: Option<RunReport>,
}

async fn stats(State(state): State<AppState>) -> Json<StatsOut> {
    let monitor = &state.monitor;
    Json(StatsOut {
        store: monitor.with_store(|s| s.stats()),
        running: monitor.is_running(),
        phase: monitor.phase(),
        last_report: monitor.last_report(),
    })
}

#[derive(Debug, Serialize)]
struct ErrorOut {
    error: String,
}

async fn run_now(State(state): State<AppState>) -> Response {
    match state.monitor.run().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e @ RunError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(ErrorOut {
                error: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "manual run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorOut {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
