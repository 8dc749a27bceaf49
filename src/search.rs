// src/search.rs
//! Search entry points: reset progress for the key, then run the lookup either
//! inline or as a background task that a newer search can abort.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::history::History;
use crate::lookup::{LookupOrchestrator, LookupOutcome, SourceError};
use crate::product::NormalizedProduct;
use crate::query::{QueryKind, SearchQuery};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub key: String,
    pub run: u64,
    pub kind: QueryKind,
    pub found: bool,
    /// True when a newer search for the same key stopped this one.
    pub superseded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<NormalizedProduct>,
    pub tried_sources: Vec<String>,
    pub errors: Vec<SourceError>,
}

impl SearchResponse {
    fn new(query: &SearchQuery, run: u64, outcome: LookupOutcome) -> Self {
        let base = Self {
            key: query.key().to_string(),
            run,
            kind: query.kind(),
            found: false,
            superseded: false,
            source: None,
            product: None,
            tried_sources: Vec::new(),
            errors: Vec::new(),
        };
        match outcome {
            LookupOutcome::Found {
                product,
                source,
                tried,
            } => Self {
                found: true,
                source: Some(source),
                product: Some(product),
                tried_sources: tried,
                ..base
            },
            LookupOutcome::NotFound { tried, errors } => Self {
                tried_sources: tried,
                errors,
                ..base
            },
            LookupOutcome::Superseded { tried, errors } => Self {
                superseded: true,
                tried_sources: tried,
                errors,
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSearch {
    pub key: String,
    pub run: u64,
    pub kind: QueryKind,
    pub total_sources: usize,
}

pub struct SearchService {
    orchestrator: Arc<LookupOrchestrator>,
    history: Arc<History>,
    /// Background runs by key: (run id, task).
    inflight: Mutex<HashMap<String, (u64, AbortHandle)>>,
}

impl SearchService {
    pub fn new(orchestrator: Arc<LookupOrchestrator>, history: Arc<History>) -> Self {
        Self {
            orchestrator,
            history,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &LookupOrchestrator {
        &self.orchestrator
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Reset progress and run the lookup to completion.
    pub async fn search(&self, query: &SearchQuery) -> SearchResponse {
        self.abort_inflight(query.key());
        let run = self.orchestrator.tracker().reset(query.key()).await;
        let outcome = self.orchestrator.run(query, run).await;
        self.history.record(query, &outcome);
        SearchResponse::new(query, run, outcome)
    }

    /// Reset progress and run the lookup in the background. Any background
    /// run already in flight for the same key is aborted.
    pub async fn start(self: &Arc<Self>, query: SearchQuery) -> StartedSearch {
        let key = query.key().to_string();
        self.abort_inflight(&key);
        let run = self.orchestrator.tracker().reset(&key).await;
        let started = StartedSearch {
            key: key.clone(),
            run,
            kind: query.kind(),
            total_sources: self.orchestrator.total_for(&query),
        };

        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let this = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = this.orchestrator.run(&query, run).await;
            this.history.record(&query, &outcome);
            this.forget(&task_key, run);
        });

        match inflight.get(&key) {
            // A concurrent start already registered a newer run.
            Some((existing, _)) if *existing > run => handle.abort(),
            _ => {
                if let Some((old_run, old)) = inflight.insert(key, (run, handle.abort_handle())) {
                    debug!(target: "search", old_run, run, "aborting superseded background lookup");
                    old.abort();
                }
            }
        }
        started
    }

    /// Number of background lookups still running.
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn abort_inflight(&self, key: &str) {
        let prev = self
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        if let Some((run, handle)) = prev {
            debug!(target: "search", run, "aborting superseded background lookup");
            handle.abort();
        }
    }

    fn forget(&self, key: &str, run: u64) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight.get(key).is_some_and(|(r, _)| *r == run) {
            inflight.remove(key);
        }
    }
}
