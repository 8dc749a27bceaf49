// src/sources/fixture.rs
//! In-process source with scripted behaviour. This is the test harness for the
//! orchestrator and HTTP layer; production only builds it in `Catalog` mode,
//! from the `fixture` entry in `sources`, for offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::SourceAdapter;
use crate::product::NormalizedProduct;
use crate::query::{QueryKind, SearchQuery};

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return this product for every query.
    Found(NormalizedProduct),
    /// Return the product registered for the query key, miss otherwise.
    Catalog(HashMap<String, NormalizedProduct>),
    NotFound,
    Fail(String),
    /// Test-only: never answers, so the per-source timeout fires.
    Hang,
    /// Test-only: panics inside the adapter task.
    Panic,
}

/// Scripted adapter used by tests and the offline `fixture` source. `calls()`
/// counts lookups so tests can assert which sources were reached.
pub struct StaticSource {
    name: String,
    behavior: Behavior,
    delay: Duration,
    kinds: Option<QueryKind>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            delay: Duration::ZERO,
            kinds: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn found(name: impl Into<String>, product: NormalizedProduct) -> Self {
        Self::new(name, Behavior::Found(product))
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::new(name, Behavior::NotFound)
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Behavior::Fail(message.into()))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Restrict to one query kind.
    pub fn only(mut self, kind: QueryKind) -> Self {
        self.kinds = Some(kind);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn lookup(&self, query: &SearchQuery) -> Result<Option<NormalizedProduct>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Found(p) => Ok(Some(p.clone())),
            Behavior::Catalog(items) => Ok(items.get(query.key()).cloned()),
            Behavior::NotFound => Ok(None),
            Behavior::Fail(msg) => Err(anyhow!("{msg}")),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, kind: QueryKind) -> bool {
        self.kinds.map_or(true, |k| k == kind)
    }
}
