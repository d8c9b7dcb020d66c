//! Reference-counted mutex-per-key registry.
//!
//! # Invariants
//! - An entry exists only while some caller holds or waits for its key.
//! - `lock` blocks until the key is free; there is no timeout.
//! - Locking a key the caller already holds deadlocks.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

struct KeyLock {
    held: Mutex<bool>,
    released: Condvar,
}

struct Entry {
    lock: Arc<KeyLock>,
    /// Holder plus waiters.
    refs: usize,
}

/// Process-wide registry of one mutex per key.
///
/// Construct one and share it through `Arc`; it is not a hidden global.
#[derive(Default)]
pub struct KeyLockRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is free, then holds it.
    ///
    /// Must be paired with exactly one [`unlock`](Self::unlock) by the same
    /// caller. Prefer [`guard`](Self::guard), which releases on every exit
    /// path including unwinding.
    pub fn lock(&self, key: &str) {
        let lock = {
            let mut entries = self.entries();
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                lock: Arc::new(KeyLock {
                    held: Mutex::new(false),
                    released: Condvar::new(),
                }),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };

        let mut held = lock.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = lock
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        debug!("event=key_lock module=lock status=acquired key={key}");
    }

    /// Releases `key`. Releasing a key nobody holds is ignored.
    pub fn unlock(&self, key: &str) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            warn!("event=key_unlock module=lock status=ignored reason=unknown_key key={key}");
            return;
        };

        {
            let mut held = entry.lock.held.lock().unwrap_or_else(PoisonError::into_inner);
            if !*held {
                warn!("event=key_unlock module=lock status=ignored reason=not_held key={key}");
                return;
            }
            *held = false;
        }
        entry.lock.released.notify_one();

        entry.refs -= 1;
        if entry.refs == 0 {
            entries.remove(key);
        }
        debug!("event=key_unlock module=lock status=ok key={key}");
    }

    /// Holds `key` until the returned guard is dropped.
    pub fn guard(self: &Arc<Self>, key: &str) -> KeyLockGuard {
        self.lock(key);
        KeyLockGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped hold on one key of a [`KeyLockRegistry`].
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyLockGuard {
    registry: Arc<KeyLockRegistry>,
    key: String,
}

impl KeyLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.registry.unlock(&self.key);
    }
}
