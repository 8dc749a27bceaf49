// src/progress/tracker.rs
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::{ProgressEntry, ProgressEvent, ProgressHub, ProgressPatch, ProgressStore};

/// Single writer path for progress: every accepted store mutation is also
/// published to the hub, so pollers and subscribers see the same state.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    hub: Arc<ProgressHub>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, hub: Arc<ProgressHub>) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub async fn reset(&self, key: &str) -> u64 {
        let run = self.store.reset(key).await;
        if let Some(entry) = self.store.get(key).await {
            self.hub.publish(ProgressEvent::from_entry(entry));
        }
        run
    }

    pub async fn update(&self, key: &str, patch: ProgressPatch) -> Option<ProgressEntry> {
        let entry = self.store.update(key, patch).await?;
        self.hub.publish(ProgressEvent::from_entry(entry.clone()));
        Some(entry)
    }

    pub async fn complete(
        &self,
        key: &str,
        run: Option<u64>,
        found: bool,
        source_name: Option<&str>,
    ) -> Option<ProgressEntry> {
        let entry = self.store.complete(key, run, found, source_name).await?;
        self.hub.publish(ProgressEvent::from_entry(entry.clone()));
        Some(entry)
    }

    pub async fn get(&self, key: &str) -> Option<ProgressEntry> {
        self.store.get(key).await
    }

    /// False once a newer `reset` replaced `run`. An expired entry counts as
    /// current: the run simply recreates it on its next update.
    pub async fn is_current(&self, key: &str, run: u64) -> bool {
        self.store.get(key).await.map_or(true, |e| e.run == run)
    }

    /// Current snapshot (if any) followed by live events. Events from runs
    /// older than one already delivered are dropped. The stream ends after a
    /// live terminal event; a terminal snapshot only describes the previous
    /// search, so the stream stays open for the next one.
    pub async fn subscribe(&self, key: &str) -> BoxStream<'static, ProgressEvent> {
        // Subscribe before reading the snapshot so nothing falls in between.
        let rx = self.hub.subscribe(key);
        let snapshot = self.store.get(key).await.map(ProgressEvent::from_entry);

        let live = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(ev) => Some((false, ev)),
                Err(e) => {
                    warn!(target: "progress", error = ?e, "progress subscriber lagged");
                    None
                }
            }
        });

        let events = Box::pin(stream::iter(snapshot.map(|ev| (true, ev))).chain(live));
        stream::unfold((events, 0u64, false), |(mut events, latest, done)| async move {
            if done {
                return None;
            }
            loop {
                let (replayed, ev) = events.next().await?;
                if ev.entry.run < latest {
                    continue;
                }
                let done = ev.is_terminal() && !replayed;
                let latest = ev.entry.run;
                return Some((ev, (events, latest, done)));
            }
        })
        .boxed()
    }

    pub async fn sweep(&self) -> (usize, usize) {
        let entries = self.store.sweep_expired().await;
        let channels = self.hub.prune();
        (entries, channels)
    }
}

/// Periodically purge expired entries and idle channels.
pub fn spawn_sweeper(tracker: ProgressTracker, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let (entries, channels) = tracker.sweep().await;
            if entries > 0 || channels > 0 {
                debug!(target: "progress", entries, channels, "swept expired progress");
            }
        }
    })
}
