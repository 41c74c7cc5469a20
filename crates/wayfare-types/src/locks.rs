use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries above this count trigger a sweep of idle locks.
const SWEEP_THRESHOLD: usize = 1024;

/// Guard returned by [`KeyedLocks::lock`]; the key is released on drop.
pub type KeyedGuard = OwnedMutexGuard<()>;

/// Registry of per-key async mutexes.
///
/// Holders of different keys proceed in parallel; holders of the same key
/// are serialized in FIFO order. The guard may be held across `.await`.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            if slots.len() >= SWEEP_THRESHOLD {
                // Only the map holds an idle slot.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of tracked keys (idle ones included until the next sweep).
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
