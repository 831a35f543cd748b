//! The nameserver's zone list.
//!
//! Each served zone is one top-level server block of the Corefile. The
//! registry owns that file: it appends blocks for new zones, cuts them out
//! again on delete and lists the zone entries currently present. All writes
//! are whole-file replacements made under a single registry lock.

pub mod corefile;

pub use corefile::{Block, BlockLayout, remove_blocks, scan_blocks};

use crate::store::{StoreError, TextStore};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Corefile is malformed: {0}")]
    Malformed(String),

    #[error("Timed out waiting for the registry lock")]
    Busy,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A zone served by the nameserver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegistryEntry {
    pub zone: String,
    pub port: u16,
}

/// What the Corefile holds under a zone's `<zone>:<port>` server key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    /// A zone entry serving `<zone>.db`
    Zone,
    /// A block with the same key that does not serve the zone file
    Foreign,
}

/// Owner of the Corefile
pub struct ZoneRegistry {
    store: Arc<dyn TextStore>,
    key: String,
    layout: BlockLayout,
    lock: Mutex<()>,
    lock_timeout: Duration,
}

impl ZoneRegistry {
    pub fn new(
        store: Arc<dyn TextStore>,
        key: impl Into<String>,
        layout: BlockLayout,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            layout,
            lock: Mutex::new(()),
            lock_timeout,
        }
    }

    /// Store key of the Corefile
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Append a server block for `zone` on `port`.
    ///
    /// Callers check for an existing entry first; this never deduplicates.
    pub fn add_entry(&self, zone: &str, port: u16) -> Result<()> {
        let _guard = self.lock()?;
        let mut text = self.load()?;

        // Refuse to append to a file we could not parse back afterwards
        scan_blocks(&text).map_err(RegistryError::Malformed)?;

        text.push_str(&self.layout.render(zone, port));
        self.store.write(&self.key, &text)?;

        info!("Registered zone {} on port {}", zone, port);
        Ok(())
    }

    /// Remove the server block keyed exactly `<zone>:<port>`.
    ///
    /// Returns whether anything was removed; the Corefile is not rewritten
    /// when nothing matched.
    pub fn remove_entry(&self, zone: &str, port: u16) -> Result<bool> {
        let _guard = self.lock()?;
        let text = self.load()?;

        let key = format!("{}:{}", zone, port);
        match remove_blocks(&text, &key).map_err(RegistryError::Malformed)? {
            Some(updated) => {
                self.store.write(&self.key, &updated)?;
                info!("Unregistered zone {} on port {}", zone, port);
                Ok(true)
            }
            None => {
                debug!("No registry entry for {}", key);
                Ok(false)
            }
        }
    }

    /// Classify the blocks keyed `<zone>:<port>`, using the same key match
    /// as [`ZoneRegistry::remove_entry`]
    pub fn entry_state(&self, zone: &str, port: u16) -> Result<EntryState> {
        let text = self.load()?;
        let blocks = scan_blocks(&text).map_err(RegistryError::Malformed)?;

        let key = format!("{}:{}", zone, port);
        let mut state = EntryState::Absent;
        for block in blocks.iter().filter(|block| block.is_single_key(&key)) {
            if block.zone_entry().is_none() {
                return Ok(EntryState::Foreign);
            }
            state = EntryState::Zone;
        }
        Ok(state)
    }

    pub fn contains(&self, zone: &str, port: u16) -> Result<bool> {
        Ok(self
            .entries()?
            .iter()
            .any(|entry| entry.zone == zone && entry.port == port))
    }

    /// Zone entries in Corefile order
    pub fn entries(&self) -> Result<Vec<RegistryEntry>> {
        let text = self.load()?;
        let blocks = scan_blocks(&text).map_err(RegistryError::Malformed)?;

        Ok(blocks
            .iter()
            .filter_map(Block::zone_entry)
            .map(|(zone, port)| RegistryEntry { zone, port })
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .try_lock_for(self.lock_timeout)
            .ok_or(RegistryError::Busy)
    }

    /// A missing Corefile reads as empty
    fn load(&self) -> Result<String> {
        Ok(self.store.read(&self.key)?.unwrap_or_default())
    }
}
