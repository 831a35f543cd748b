use crate::store::StoreError;
use thiserror::Error;

/// Zone-file errors
#[derive(Debug, Clone, Error)]
pub enum ZoneError {
    /// No zone file exists for this name
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// A zone file already exists for this name
    #[error("Zone already exists: {0}")]
    ZoneExists(String),

    /// Record for this host already present and duplicates are rejected
    #[error("Record for {host} already exists in zone {zone}")]
    DuplicateHost { zone: String, host: String },

    /// Zone file content does not follow the zone-file format
    #[error("Zone {zone} is corrupt at line {line}: {reason}")]
    Corrupt {
        zone: String,
        line: usize,
        reason: String,
    },

    /// Zone file exceeds maximum size
    #[error("Zone file for {0} exceeds maximum size")]
    FileTooLarge(String),

    /// SOA serial cannot be incremented without wrapping
    #[error("SOA serial of zone {0} is exhausted")]
    SerialExhausted(String),

    /// Lock wait timed out
    #[error("Zone {0} is busy, retry later")]
    Busy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
