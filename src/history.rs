//! In-memory log of finished lookups for diagnostics.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lookup::LookupOutcome;
use crate::query::SearchQuery;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    /// Barcode, or hashed id for free-text queries.
    pub query: String,
    pub outcome: &'static str,
    pub source: Option<String>,
    pub tried: usize,
    pub errors: usize,
}

#[derive(Debug)]
pub struct History {
    inner: Mutex<VecDeque<HistoryEntry>>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn record(&self, query: &SearchQuery, outcome: &LookupOutcome) {
        let entry = HistoryEntry {
            at: Utc::now(),
            query: query.log_id(),
            outcome: outcome.label(),
            source: outcome.source().map(str::to_string),
            tried: outcome.tried().len(),
            errors: outcome.errors().len(),
        };

        let mut v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.push_back(entry);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Newest last.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<HistoryEntry> {
        let v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let start = v.len().saturating_sub(n);
        v.iter().skip(start).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_newest_entries() {
        let h = History::with_capacity(2);
        let q = SearchQuery::parse("12345678").unwrap();
        for n in 0..3 {
            let outcome = LookupOutcome::NotFound {
                tried: vec!["A".to_string(); n],
                errors: vec![],
            };
            h.record(&q, &outcome);
        }
        let rows = h.snapshot_last_n(10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tried, 1);
        assert_eq!(rows[1].tried, 2);
        assert_eq!(rows[1].outcome, "not_found");
    }
}
