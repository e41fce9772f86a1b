//! Per-resource lock registry
//!
//! Maps a resource key to a reusable exclusive lock, created on first use.
//! Guarantees at most one in-flight derivation per key while callers for
//! different keys proceed fully in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

/// Process-wide registry of per-resource locks.
///
/// One lock instance exists per distinct key for the process lifetime;
/// entries are never removed, so growth is one entry per distinct resource
/// ever requested.
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `key`, inserting the entry on first use.
    ///
    /// Resolves once the caller holds the key exclusively; dropping the
    /// returned guard releases it. Waiting is cancel-safe: a waiter whose
    /// future is dropped never acquires the lock and leaves the registry
    /// consistent.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    /// Look up or create the lock entry for `key`.
    ///
    /// The registry mutex is held only for the map access, never across a
    /// derivation, so callers for unrelated keys do not contend here.
    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("key lock registry poisoned");
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Number of distinct keys ever locked
    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().expect("key lock registry poisoned").len()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}
