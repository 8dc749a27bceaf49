// src/progress/mod.rs
//! Live progress of in-flight lookups: keyed store, per-key fan-out hub, and the
//! tracker that feeds both from a single stream of mutations.

pub mod hub;
pub mod store;
pub mod tracker;

pub use hub::ProgressHub;
pub use store::{MemoryProgressStore, ProgressStore, DEFAULT_PROGRESS_TTL};
pub use tracker::{spawn_sweeper, ProgressTracker};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of one lookup, keyed by the normalized query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub key: String,
    /// Run id assigned by the last `reset`; updates from older runs are rejected.
    pub run: u64,
    pub current_source: String,
    pub completed_sources: Vec<String>,
    pub total_sources: usize,
    pub found: bool,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEntry {
    pub(crate) fn idle(key: &str, run: u64) -> Self {
        Self {
            key: key.to_string(),
            run,
            current_source: String::new(),
            completed_sources: Vec::new(),
            total_sources: 0,
            found: false,
            is_complete: false,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Merge a patch. `completed_sources` only grows, `found` and
    /// `is_complete` never go back to false.
    pub(crate) fn apply(&mut self, patch: ProgressPatch) {
        if let Some(total) = patch.total_sources {
            self.total_sources = total;
        }
        if let Some(src) = patch.current_source {
            self.current_source = src;
        }
        if let Some(done) = patch.completed_source {
            if !self.found {
                self.completed_sources.push(done);
            }
        }
        if patch.found == Some(true) {
            self.found = true;
        }
        if let Some(err) = patch.error {
            self.error = Some(err);
        }
        if patch.is_complete == Some(true) {
            self.is_complete = true;
        }
        if self.is_complete {
            self.current_source.clear();
        }
        self.timestamp = Utc::now();
    }
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    /// When set, the patch only applies to this run.
    pub run: Option<u64>,
    pub current_source: Option<String>,
    /// Appended to `completed_sources`.
    pub completed_source: Option<String>,
    pub total_sources: Option<usize>,
    pub found: Option<bool>,
    pub is_complete: Option<bool>,
    pub error: Option<String>,
}

impl ProgressPatch {
    pub fn for_run(run: u64) -> Self {
        Self {
            run: Some(run),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEventKind {
    Progress,
    Complete,
    Error,
}

/// Message delivered to push subscribers: `{type, ...entry}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    #[serde(flatten)]
    pub entry: ProgressEntry,
}

impl ProgressEvent {
    pub fn from_entry(entry: ProgressEntry) -> Self {
        let kind = match (entry.is_complete, entry.error.is_some()) {
            (false, _) => ProgressEventKind::Progress,
            (true, false) => ProgressEventKind::Complete,
            (true, true) => ProgressEventKind::Error,
        };
        Self { kind, entry }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind != ProgressEventKind::Progress
    }

    pub fn event_name(&self) -> &'static str {
        match self.kind {
            ProgressEventKind::Progress => "progress",
            ProgressEventKind::Complete => "complete",
            ProgressEventKind::Error => "error",
        }
    }
}
