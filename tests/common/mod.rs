//! Shared helpers for the integration tests

#![allow(dead_code)] // Not every test file uses every helper

use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zonekeeper::config::ApiConfig;
use zonekeeper::service::ZoneService;
use zonekeeper::store::{MemoryStore, StoreError, TextStore};

/// Corefile the nameserver ships with before any zone is added
pub const BASE_COREFILE: &str = "(snip_base) {\n    errors\n    log\n}\n\n.:1053 {\n    import snip_base\n    forward . /etc/resolv.conf\n}\n";

pub const LOCK_TIMEOUT: Duration = Duration::from_millis(200);

/// Store wrapper that counts mutations and fails chosen keys on demand
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing_writes: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    mutations: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corefile() -> Self {
        let store = Self::new();
        store.inner.write("Corefile", BASE_COREFILE).unwrap();
        store
    }

    /// Make every write or create of `key` fail
    pub fn fail_writes(&self, key: &str) {
        self.failing_writes.lock().insert(key.to_string());
    }

    /// Make every removal of `key` fail
    pub fn fail_removes(&self, key: &str) {
        self.failing_removes.lock().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing_writes.lock().clear();
        self.failing_removes.lock().clear();
    }

    /// Successful writes, creates and removals so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read(key).unwrap()
    }

    fn check(&self, set: &Mutex<HashSet<String>>, key: &str) -> Result<(), StoreError> {
        if set.lock().contains(key) {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: Arc::new(io::Error::other("injected failure")),
            });
        }
        Ok(())
    }
}

impl TextStore for FaultyStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.check(&self.failing_writes, key)?;
        self.inner.write(key, contents)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_new(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.check(&self.failing_writes, key)?;
        self.inner.create_new(key, contents)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check(&self.failing_removes, key)?;
        let removed = self.inner.remove(key)?;
        if removed {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    fn size(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.inner.size(key)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}

/// Configuration matching the deployment defaults with short lock waits
pub fn test_config() -> ApiConfig {
    ApiConfig {
        lock_timeout: LOCK_TIMEOUT,
        ..Default::default()
    }
}

/// Service over a fresh faulty store holding the base Corefile
pub fn faulty_service() -> (Arc<FaultyStore>, ZoneService) {
    faulty_service_with(&test_config())
}

pub fn faulty_service_with(config: &ApiConfig) -> (Arc<FaultyStore>, ZoneService) {
    let store = Arc::new(FaultyStore::with_corefile());
    let service = ZoneService::from_config(config, store.clone());
    (store, service)
}
