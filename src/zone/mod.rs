pub mod errors;
pub mod file;
pub mod record;
#[allow(clippy::module_inception)]
pub mod zone;

pub use errors::{Result, ZoneError};
pub use file::{DuplicateHostPolicy, RecordDeletion, RecordPolicy, ZoneFile, ZoneGuard};
pub use record::{AddressRecord, SoaFields, SoaRecord, initial_serial, qualify_host};
pub use zone::Zone;

/// Zone constants
pub mod constants {
    /// Default TTL for address records when none is given (1 hour)
    pub const DEFAULT_TTL: u32 = 3600;

    /// Maximum zone file size (10MB)
    pub const MAX_ZONE_FILE_SIZE: usize = 10 * 1024 * 1024;

    /// Store key suffix of zone files
    pub const ZONE_FILE_SUFFIX: &str = ".db";
}
