// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metric descriptions (so series show up on /metrics with help text).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs started.");
        describe_counter!("pipeline_items_seen_total", "Raw items returned by all feeds.");
        describe_counter!(
            "pipeline_items_written_total",
            "Items appended to the review sheet."
        );
        describe_counter!(
            "pipeline_items_failed_total",
            "Items that failed a stage (score, post, image, write, timeout)."
        );
        describe_counter!(
            "pipeline_items_filtered_total",
            "Items rejected by the keyword gate or the relevance score."
        );
        describe_counter!(
            "pipeline_retry_attempts_total",
            "Retries issued on transient external-call errors."
        );
        describe_counter!(
            "image_stage_success_total",
            "Images accepted, labelled by fallback stage."
        );
        describe_counter!("ingest_events_total", "Items parsed from feeds.");
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("pipeline_run_duration_ms", "Wall time of one run in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the last run started.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if another recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        render_router(self.handle.clone())
    }
}

pub(crate) fn render_router<S>(handle: PrometheusHandle) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
