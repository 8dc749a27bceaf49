use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Process-wide Prometheus recorder. Installed on first call; later calls
    /// (e.g. several routers in one test binary) share it.
    pub fn global() -> Result<&'static Metrics> {
        static METRICS: OnceCell<Metrics> = OnceCell::new();
        METRICS.get_or_try_init(|| {
            // Use default buckets to avoid API differences across crate versions.
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("prometheus: install recorder")?;
            Ok(Metrics { handle })
        })
    }

    /// Static gauges describing the active configuration.
    pub fn record_config(&self, progress_ttl_secs: u64, source_count: usize) {
        gauge!("lookup_progress_ttl_secs").set(progress_ttl_secs as f64);
        gauge!("lookup_sources_configured").set(source_count as f64);
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
