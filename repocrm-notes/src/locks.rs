//! Per-key async write serialization.
//!
//! Two saves for the same note id must not race on the version token, so
//! writers queue on a mutex keyed by path. Unrelated keys never block each
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily created async mutexes, one per key.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Waiters are served in FIFO order.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            // Entries referenced only by the map are idle.
            slots.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.values().filter(|m| Arc::strong_count(m) > 1).count()
    }
}
