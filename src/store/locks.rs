use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::trace;

/// Table of exclusive per-key locks.
///
/// Holding a [`KeyGuard`] for a key excludes every other holder of the same
/// key; different keys never contend beyond the short bookkeeping section.
/// Entries only exist while held, so the table does not grow with the number
/// of keys ever seen.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to `key`
    pub fn acquire(&self, key: &str, timeout: Duration) -> Option<KeyGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();

        while held.contains(key) {
            if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(key) {
                trace!("Gave up waiting for lock on {}", key);
                return None;
            }
        }

        held.insert(key.to_string());
        trace!("Acquired lock on {}", key);

        Some(KeyGuard {
            locks: self,
            key: key.to_string(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }

    fn release(&self, key: &str) {
        self.held.lock().remove(key);
        self.released.notify_all();
        trace!("Released lock on {}", key);
    }
}

/// Exclusive access to one key of a [`KeyLocks`] table; released on drop
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this guard was issued by `locks`
    pub fn belongs_to(&self, locks: &KeyLocks) -> bool {
        std::ptr::eq(self.locks, locks)
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}
