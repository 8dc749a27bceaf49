// src/progress/hub.rs
//! Per-key fan-out of progress events to push subscribers.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use super::ProgressEvent;

/// Registry of one broadcast channel per key. A channel is dropped from the
/// registry once its last subscriber disconnects.
pub struct ProgressHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressHub {
    /// `capacity` is the number of events a slow subscriber may lag behind.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let rx = tx.subscribe();
        debug!(target: "progress", key, subscribers = tx.receiver_count(), "subscriber added");
        rx
    }

    /// Deliver `event` to every subscriber of its key. Returns the number of
    /// receivers reached.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let key = event.entry.key.clone();
        let tx = {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            match channels.get(&key) {
                Some(tx) => tx.clone(),
                None => return 0,
            }
        };

        match tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                self.remove_if_idle(&key);
                0
            }
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Drop channels nobody listens to any more.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn remove_if_idle(&self, key: &str) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if channels.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(key);
            debug!(target: "progress", key, "last subscriber gone; channel removed");
        }
    }
}
