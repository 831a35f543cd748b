use super::{Result, StoreError, TextStore, check_key};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `(key, contents)` pairs
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (key, contents) in entries {
            store.entries.insert(key.into(), contents.into());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TextStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        check_key(key)?;
        self.entries.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn create_new(&self, key: &str, contents: &str) -> Result<()> {
        check_key(key)?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(contents.to_string());
                Ok(())
            }
        }
    }

    fn remove(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        check_key(key)?;
        Ok(self.entries.get(key).map(|entry| entry.value().len() as u64))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.entries.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}
