//! Keyed text-record storage.
//!
//! Zone files and the Corefile are plain text artifacts. Everything above this
//! module addresses them by key (`example.com.db`, `Corefile`) through the
//! [`TextStore`] trait instead of touching paths directly:
//! - [`FileStore`] keeps one file per key inside a directory and replaces
//!   contents atomically
//! - [`MemoryStore`] keeps everything in a concurrent map, used by tests and
//!   benchmarks
//! - [`KeyLocks`] hands out per-key exclusive guards with a bounded wait

use std::sync::Arc;
use thiserror::Error;

pub mod fs;
pub mod locks;
pub mod memory;

pub use fs::FileStore;
pub use locks::{KeyGuard, KeyLocks};
pub use memory::MemoryStore;

/// Errors raised by a storage backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Invalid store key: {0:?}")]
    InvalidKey(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl StoreError {
    pub(crate) fn io(key: &str, err: std::io::Error) -> Self {
        StoreError::Io {
            key: key.to_string(),
            source: Arc::new(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Backend holding whole text artifacts addressed by key.
///
/// Implementations must make `write` and `create_new` all-or-nothing: a reader
/// observes either the previous contents or the new contents, never a mix.
pub trait TextStore: Send + Sync {
    /// Read the full contents of `key`, `None` if it does not exist
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the contents of `key`, creating it if needed
    fn write(&self, key: &str, contents: &str) -> Result<()>;

    /// Create `key` with `contents`, failing with `AlreadyExists` if present
    fn create_new(&self, key: &str, contents: &str) -> Result<()>;

    /// Remove `key`; returns whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// Size of `key` in bytes without reading it, `None` if it does not exist
    fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Check whether `key` exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// List every key currently stored, sorted
    fn keys(&self) -> Result<Vec<String>>;
}

/// Keys become file names, so anything that could escape the directory is refused
pub(crate) fn check_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.starts_with('.')
        || key.contains(|c: char| matches!(c, '/' | '\\' | '\0'));

    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("example.com.db").is_ok());
        assert!(check_key("Corefile").is_ok());

        assert!(check_key("").is_err());
        assert!(check_key("..").is_err());
        assert!(check_key(".hidden").is_err());
        assert!(check_key("../etc/passwd").is_err());
        assert!(check_key("a/b.db").is_err());
        assert!(check_key("a\\b.db").is_err());
    }
}
