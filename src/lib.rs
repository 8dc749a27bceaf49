// src/lib.rs
// Public library surface for integration tests and the Shuttle binary.

pub mod api;
pub mod config;
pub mod history;
pub mod lookup;
pub mod metrics;
pub mod product;
pub mod progress;
pub mod query;
pub mod search;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::lookup::{LookupOrchestrator, LookupOutcome};
pub use crate::product::NormalizedProduct;
pub use crate::progress::{ProgressEntry, ProgressTracker};
pub use crate::query::SearchQuery;

use axum::Router;
use tracing::info;

/// Build the full application router from on-disk/env configuration:
/// sources in configured order, progress sweeper, and `/metrics`.
///
/// Must be called inside a Tokio runtime (spawns the sweeper task).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = config::LookupConfig::load_default()?;
    let client = sources::http_client(cfg.source_timeout())?;
    let sources = sources::build_sources(&cfg, &client)?;

    let state = AppState::build(&cfg, sources);
    progress::spawn_sweeper(state.tracker().clone(), cfg.sweep_interval());

    let names = state.search().orchestrator().source_names();
    info!(
        target: "lookup",
        sources = ?names,
        timeout_ms = cfg.source_timeout_ms,
        "lookup service ready"
    );

    let metrics = metrics::Metrics::global()?;
    metrics.record_config(cfg.progress_ttl_secs, names.len());

    Ok(router(state).merge(metrics.router()))
}
