use std::sync::OnceLock;

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self, BuildError> {
        // Use default buckets to avoid API differences across crate versions.
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

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        describe_counter!("scan_runs_total", "Scans started.");
        describe_counter!(
            "scan_outcomes_total",
            "Per-source outcomes, labelled by status."
        );
        describe_gauge!("scan_in_flight", "Workers currently past the concurrency gate.");
        describe_gauge!("scan_last_run_ts", "Unix ts when a scan last started.");
        describe_counter!(
            "feed_fetch_fallback_total",
            "Fetches that needed the browser-header retry."
        );
        describe_counter!(
            "feed_fetch_errors_total",
            "Fetches that failed after both stages."
        );
        describe_counter!("feed_entries_total", "Entries parsed from feeds.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("llm_call_ms", "Successful chat call latency in milliseconds.");
        describe_counter!(
            "llm_call_errors_total",
            "Failed chat calls, labelled by kind (status, timeout, transport, decode, ...)."
        );
    });
}
