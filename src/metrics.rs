use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!("trend_cycles_total", "Completed pipeline cycles.");
    describe_counter!(
        "trend_cycle_failures_total",
        "Cycles aborted by a persistence failure or a panic."
    );
    describe_counter!(
        "trend_cycles_skipped_total",
        "Scheduled ticks skipped because the bot is paused."
    );
    describe_counter!("trend_items_ingested_total", "Items kept after normalization.");
    describe_counter!(
        "trend_ingest_errors_total",
        "Provider errors and timeouts (cycle continues with no items)."
    );
    describe_counter!("trend_items_selected_total", "Items selected for a digest.");
    describe_counter!("trend_items_notified_total", "Items marked as notified.");
    describe_counter!(
        "trend_enrich_degraded_total",
        "Enrichment calls replaced by the degraded insight."
    );
    describe_counter!(
        "trend_dispatch_failures_total",
        "Digests no channel delivered (items stay eligible)."
    );
    describe_counter!("trend_notify_sent_total", "Per-channel successful sends.");
    describe_counter!("trend_notify_failed_total", "Per-channel failed sends.");
    describe_gauge!("trend_candidates", "Un-notified items scored in the last cycle.");
    describe_gauge!("trend_last_cycle_ts", "Unix ts when the last cycle finished.");
    describe_histogram!("trend_cycle_ms", "Full cycle duration in milliseconds.");
    describe_histogram!("trend_ingest_ms", "Provider fetch time in milliseconds.");
    describe_counter!(
        "trend_youtube_videos_total",
        "Videos parsed from YouTube chart responses."
    );
    describe_histogram!(
        "trend_youtube_parse_ms",
        "YouTube response parse time in milliseconds."
    );
    describe_gauge!("trend_cycle_interval_secs", "Configured scheduler interval.");
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if another recorder is already set.
    pub fn init(interval_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("trend_cycle_interval_secs").set(interval_secs as f64);

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
