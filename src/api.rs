// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::history::RunHistory;
use crate::model::RunRecord;
use crate::orchestrator::Pipeline;
use crate::scheduler;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history: Arc<RunHistory>,
}

/// Status surface. `metrics` adds `/metrics` when a recorder is installed.
pub fn router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/run", post(start_run));
    if let Some(handle) = metrics {
        app = app.merge(crate::metrics::render_router(handle));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Serialize)]
struct StatusOut {
    running: bool,
    runs: Vec<RunRecord>,
}

async fn status(State(state): State<AppState>, Query(q): Query<StatusQuery>) -> Json<StatusOut> {
    Json(StatusOut {
        running: state.pipeline.is_running(),
        runs: state.history.snapshot_last_n(q.limit.min(100)),
    })
}

#[derive(Serialize)]
struct RunAccepted {
    started: bool,
    message: &'static str,
}

async fn start_run(State(state): State<AppState>) -> (StatusCode, Json<RunAccepted>) {
    if state.pipeline.is_running() {
        return (
            StatusCode::CONFLICT,
            Json(RunAccepted {
                started: false,
                message: "a run is already in progress",
            }),
        );
    }
    tokio::spawn(async move {
        scheduler::trigger(&state.pipeline, &state.history, "http").await;
    });
    (
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            started: true,
            message: "run started",
        }),
    )
}
