// src/lookup/mod.rs
//! Sequential, priority-ordered lookup across food sources with per-attempt
//! progress reporting.

pub mod types;

pub use types::{LookupOutcome, SourceError};

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::product::SourceResult;
use crate::progress::{ProgressPatch, ProgressTracker};
use crate::query::{QueryKind, SearchQuery};
use crate::sources::DynSource;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "lookup_source_attempts_total",
            "Source adapter calls by source and outcome."
        );
        describe_histogram!("lookup_source_ms", "Source adapter latency in milliseconds.");
        describe_counter!("lookup_runs_total", "Finished lookups by outcome.");
    });
}

/// Aborts the wrapped task when dropped, so a timed-out or abandoned adapter
/// call does not keep running in the background.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct LookupOrchestrator {
    sources: Vec<DynSource>,
    tracker: ProgressTracker,
    source_timeout: Duration,
}

impl LookupOrchestrator {
    /// `sources` must already be in priority order; it is never reordered.
    pub fn new(
        sources: Vec<DynSource>,
        tracker: ProgressTracker,
        source_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            tracker,
            source_timeout,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    fn applicable(&self, kind: QueryKind) -> Vec<DynSource> {
        self.sources
            .iter()
            .filter(|s| s.supports(kind))
            .cloned()
            .collect()
    }

    pub fn total_for(&self, query: &SearchQuery) -> usize {
        self.sources.iter().filter(|s| s.supports(query.kind())).count()
    }

    /// Try each applicable source in order until one returns a usable product.
    /// `run` is the id returned by the `reset` that started this search.
    pub async fn run(&self, query: &SearchQuery, run: u64) -> LookupOutcome {
        ensure_metrics_described();
        let key = query.key();
        let sources = self.applicable(query.kind());
        let total = sources.len();
        info!(target: "lookup", query = %query.log_id(), run, total, "lookup started");

        let mut tried: Vec<String> = Vec::with_capacity(total);
        let mut errors: Vec<SourceError> = Vec::new();

        // Every patch repeats the total so an entry that expired mid-run is
        // recreated with it.
        let base = || ProgressPatch {
            total_sources: Some(total),
            ..ProgressPatch::for_run(run)
        };
        if self.tracker.update(key, base()).await.is_none() {
            return self.superseded(query, run, tried, errors);
        }

        if total == 0 {
            let patch = ProgressPatch {
                error: Some(format!("no sources available for {:?} queries", query.kind())),
                is_complete: Some(true),
                ..base()
            };
            self.tracker.update(key, patch).await;
            return self.finish(query, LookupOutcome::NotFound { tried, errors });
        }

        for source in sources {
            if !self.tracker.is_current(key, run).await {
                return self.superseded(query, run, tried, errors);
            }

            let name = source.name().to_string();
            let trying = ProgressPatch {
                current_source: Some(name.clone()),
                ..base()
            };
            if self.tracker.update(key, trying).await.is_none() {
                return self.superseded(query, run, tried, errors);
            }

            let result = self.attempt(&source, query).await;
            tried.push(name.clone());

            if let Some(product) = result.product.filter(|_| result.found) {
                let matched = ProgressPatch {
                    completed_source: Some(name.clone()),
                    found: Some(true),
                    is_complete: Some(true),
                    ..base()
                };
                self.tracker.update(key, matched).await;
                return self.finish(
                    query,
                    LookupOutcome::Found {
                        product,
                        source: name,
                        tried,
                    },
                );
            }

            if let Some(message) = result.error_message {
                errors.push(SourceError {
                    source: name.clone(),
                    message,
                });
            }

            let done = ProgressPatch {
                completed_source: Some(name),
                ..base()
            };
            if self.tracker.update(key, done).await.is_none() {
                return self.superseded(query, run, tried, errors);
            }
        }

        let exhausted = ProgressPatch {
            found: Some(false),
            is_complete: Some(true),
            ..base()
        };
        self.tracker.update(key, exhausted).await;
        self.finish(query, LookupOutcome::NotFound { tried, errors })
    }

    /// Call one source on its own task, bounded by the per-source timeout.
    /// Errors, panics, timeouts and unusable payloads all become a
    /// non-matching `SourceResult`.
    async fn attempt(&self, source: &DynSource, query: &SearchQuery) -> SourceResult {
        let name = source.name().to_string();
        let t0 = Instant::now();

        let task = {
            let source = source.clone();
            let query = query.clone();
            tokio::spawn(async move { source.lookup(&query).await })
        };
        let _guard = AbortOnDrop(task.abort_handle());

        let result = match tokio::time::timeout(self.source_timeout, task).await {
            Ok(Ok(Ok(Some(product)))) if product.is_usable() => SourceResult::found(&name, product),
            Ok(Ok(Ok(_))) => SourceResult::not_found(&name),
            Ok(Ok(Err(e))) => SourceResult::failed(&name, format!("{e:#}")),
            Ok(Err(join)) if join.is_panic() => SourceResult::failed(&name, "source panicked"),
            Ok(Err(_)) => SourceResult::failed(&name, "source task cancelled"),
            Err(_) => SourceResult::failed(
                &name,
                format!("timed out after {} ms", self.source_timeout.as_millis()),
            ),
        };

        let outcome = match (&result.found, &result.error_message) {
            (true, _) => "found",
            (false, None) => "not_found",
            (false, Some(_)) => "error",
        };
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        counter!("lookup_source_attempts_total", "source" => name.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("lookup_source_ms", "source" => name.clone()).record(ms);

        match &result.error_message {
            Some(err) => warn!(target: "lookup", source = %name, error = %err, "source failed"),
            None => debug!(target: "lookup", source = %name, outcome, ms, "source answered"),
        }
        result
    }

    fn superseded(
        &self,
        query: &SearchQuery,
        run: u64,
        tried: Vec<String>,
        errors: Vec<SourceError>,
    ) -> LookupOutcome {
        info!(target: "lookup", query = %query.log_id(), run, "lookup superseded by newer search");
        self.finish(query, LookupOutcome::Superseded { tried, errors })
    }

    fn finish(&self, query: &SearchQuery, outcome: LookupOutcome) -> LookupOutcome {
        counter!("lookup_runs_total", "outcome" => outcome.label()).increment(1);
        info!(
            target: "lookup",
            query = %query.log_id(),
            outcome = outcome.label(),
            source = outcome.source().unwrap_or(""),
            tried = outcome.tried().len(),
            errors = outcome.errors().len(),
            "lookup finished"
        );
        outcome
    }
}
