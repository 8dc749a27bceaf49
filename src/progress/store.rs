// src/progress/store.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ProgressEntry, ProgressPatch};

/// Entries are purged this long after their last mutation.
pub const DEFAULT_PROGRESS_TTL: Duration = Duration::from_secs(5 * 60);

/// Keyed progress state. Kept behind a trait so a shared cache can replace the
/// in-process map; the HTTP layer currently assumes single-process affinity.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Start a fresh idle entry for `key` and return its run id.
    async fn reset(&self, key: &str) -> u64;

    /// Merge `patch` into the entry (creating it if absent). Returns the new
    /// snapshot, or `None` when the patch targets a superseded run.
    async fn update(&self, key: &str, patch: ProgressPatch) -> Option<ProgressEntry>;

    async fn get(&self, key: &str) -> Option<ProgressEntry>;

    /// Drop expired entries; returns how many were removed.
    async fn sweep_expired(&self) -> usize;

    async fn complete(
        &self,
        key: &str,
        run: Option<u64>,
        found: bool,
        source_name: Option<&str>,
    ) -> Option<ProgressEntry> {
        let patch = ProgressPatch {
            run,
            completed_source: source_name.filter(|_| found).map(str::to_string),
            found: Some(found),
            is_complete: Some(true),
            ..Default::default()
        };
        self.update(key, patch).await
    }
}

struct Slot {
    entry: ProgressEntry,
    touched: Instant,
}

/// In-memory store with timestamp-based expiry.
pub struct MemoryProgressStore {
    slots: RwLock<HashMap<String, Slot>>,
    ttl: Duration,
    next_run: AtomicU64,
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_PROGRESS_TTL)
    }
}

impl MemoryProgressStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
            next_run: AtomicU64::new(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.touched) >= self.ttl
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn reset(&self, key: &str) -> u64 {
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let slot = Slot {
            entry: ProgressEntry::idle(key, run),
            touched: Instant::now(),
        };
        self.write().insert(key.to_string(), slot);
        tracing::debug!(target: "progress", key, run, "progress reset");
        run
    }

    async fn update(&self, key: &str, patch: ProgressPatch) -> Option<ProgressEntry> {
        let now = Instant::now();
        let mut slots = self.write();

        if slots.get(key).is_some_and(|s| self.is_expired(s, now)) {
            slots.remove(key);
        }

        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: ProgressEntry::idle(key, patch.run.unwrap_or(0)),
            touched: now,
        });

        if let Some(run) = patch.run {
            if slot.entry.run != run {
                tracing::debug!(
                    target: "progress",
                    key,
                    stale_run = run,
                    current_run = slot.entry.run,
                    "ignoring update from superseded run"
                );
                return None;
            }
        }

        slot.entry.apply(patch);
        slot.touched = now;
        Some(slot.entry.clone())
    }

    async fn get(&self, key: &str) -> Option<ProgressEntry> {
        let now = Instant::now();
        {
            let slots = self.read();
            match slots.get(key) {
                None => return None,
                Some(slot) if !self.is_expired(slot, now) => return Some(slot.entry.clone()),
                Some(_) => {}
            }
        }
        let mut slots = self.write();
        if slots.get(key).is_some_and(|s| self.is_expired(s, now)) {
            slots.remove(key);
        }
        None
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.write();
        let before = slots.len();
        slots.retain(|_, slot| !self.is_expired(slot, now));
        before - slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_yields_idle_entry() {
        let store = MemoryProgressStore::default();
        store
            .update(
                "k",
                ProgressPatch {
                    completed_source: Some("A".into()),
                    is_complete: Some(true),
                    ..Default::default()
                },
            )
            .await;

        let run = store.reset("k").await;
        let e = store.get("k").await.unwrap();
        assert_eq!(e.run, run);
        assert!(e.completed_sources.is_empty());
        assert!(!e.found);
        assert!(!e.is_complete);
        assert_eq!(e.current_source, "");
    }

    #[tokio::test]
    async fn unknown_key_is_absent() {
        let store = MemoryProgressStore::default();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn update_creates_missing_entry() {
        let store = MemoryProgressStore::default();
        let e = store
            .update(
                "k",
                ProgressPatch {
                    current_source: Some("USDA".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(e.current_source, "USDA");
        assert_eq!(store.get("k").await, Some(e));
    }

    #[tokio::test]
    async fn reads_have_no_side_effects() {
        let store = MemoryProgressStore::default();
        let run = store.reset("k").await;
        store
            .update(
                "k",
                ProgressPatch {
                    completed_source: Some("A".into()),
                    ..ProgressPatch::for_run(run)
                },
            )
            .await;
        let a = store.get("k").await;
        let b = store.get("k").await;
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn stale_run_updates_are_rejected() {
        let store = MemoryProgressStore::default();
        let old = store.reset("k").await;
        let new = store.reset("k").await;
        assert!(new > old);

        let stale = ProgressPatch {
            completed_source: Some("A".into()),
            ..ProgressPatch::for_run(old)
        };
        assert!(store.update("k", stale).await.is_none());
        assert!(store.get("k").await.unwrap().completed_sources.is_empty());
    }

    #[tokio::test]
    async fn complete_folds_source_only_when_found() {
        let store = MemoryProgressStore::default();
        let run = store.reset("a").await;
        let e = store.complete("a", Some(run), true, Some("USDA")).await.unwrap();
        assert_eq!(e.completed_sources, vec!["USDA".to_string()]);
        assert!(e.found && e.is_complete);

        let run = store.reset("b").await;
        let e = store.complete("b", Some(run), false, Some("USDA")).await.unwrap();
        assert!(e.completed_sources.is_empty());
        assert!(!e.found && e.is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_last_update() {
        let store = MemoryProgressStore::with_ttl(Duration::from_secs(300));
        let run = store.reset("k").await;

        tokio::time::advance(Duration::from_secs(200)).await;
        store
            .update("k", ProgressPatch {
                current_source: Some("A".into()),
                ..ProgressPatch::for_run(run)
            })
            .await;

        // 200s after the update: still alive even though reset was 400s ago.
        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(store.get("k").await.is_some());

        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(store.get("k").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let store = MemoryProgressStore::with_ttl(Duration::from_secs(60));
        store.reset("old").await;
        tokio::time::advance(Duration::from_secs(61)).await;
        store.reset("fresh").await;

        assert_eq!(store.sweep_expired().await, 1);
        assert!(store.get("old").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }
}
