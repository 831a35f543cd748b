use super::{
    AddressRecord, Result, SoaFields, SoaRecord, Zone, ZoneError, constants, initial_serial,
};
use crate::store::{KeyGuard, KeyLocks, StoreError, TextStore};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Exclusive access to one zone, obtained from [`ZoneFile::lock`]
pub type ZoneGuard<'a> = KeyGuard<'a>;

/// What `add_record` does when the host already has a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHostPolicy {
    /// Refuse the add, leaving the zone untouched
    #[default]
    Reject,
    /// Append anyway; delete-by-name later removes every match
    Allow,
}

impl FromStr for DuplicateHostPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(DuplicateHostPolicy::Reject),
            "allow" => Ok(DuplicateHostPolicy::Allow),
            other => Err(format!("Unknown duplicate host policy: {}", other)),
        }
    }
}

/// Record mutation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPolicy {
    pub duplicate_hosts: DuplicateHostPolicy,
    /// Bump the serial on a delete that matched nothing
    pub bump_serial_on_noop_delete: bool,
}

impl Default for RecordPolicy {
    fn default() -> Self {
        Self {
            duplicate_hosts: DuplicateHostPolicy::Reject,
            bump_serial_on_noop_delete: true,
        }
    }
}

/// Outcome of [`ZoneFile::delete_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordDeletion {
    /// Number of record lines removed
    pub removed: usize,
    /// SOA serial after the operation
    pub serial: u32,
}

/// Owner of the per-zone record files.
///
/// Every mutation is a full read-modify-write of `<zone>.db` performed while
/// the caller holds that zone's [`ZoneGuard`], so two writers on one zone
/// never interleave.
pub struct ZoneFile {
    store: Arc<dyn TextStore>,
    locks: KeyLocks,
    lock_timeout: Duration,
    policy: RecordPolicy,
}

impl ZoneFile {
    pub fn new(store: Arc<dyn TextStore>, lock_timeout: Duration, policy: RecordPolicy) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
            lock_timeout,
            policy,
        }
    }

    pub fn policy(&self) -> RecordPolicy {
        self.policy
    }

    /// Store key of a zone's file
    pub fn key(zone: &str) -> String {
        format!("{}{}", zone, constants::ZONE_FILE_SUFFIX)
    }

    /// Wait for exclusive access to `zone`, failing with `Busy` after the lock timeout
    pub fn lock(&self, zone: &str) -> Result<ZoneGuard<'_>> {
        self.locks
            .acquire(zone, self.lock_timeout)
            .ok_or_else(|| ZoneError::Busy(zone.to_string()))
    }

    pub fn exists(&self, guard: &ZoneGuard<'_>) -> Result<bool> {
        let zone = self.zone_of(guard);
        Ok(self.store.exists(&Self::key(zone))?)
    }

    /// Create the zone file with a serial derived from the current local hour
    pub fn create(&self, guard: &ZoneGuard<'_>, fields: &SoaFields) -> Result<Zone> {
        self.create_at(guard, fields, &Local::now())
    }

    /// Create the zone file as if at `now`
    pub fn create_at<Tz: TimeZone>(
        &self,
        guard: &ZoneGuard<'_>,
        fields: &SoaFields,
        now: &DateTime<Tz>,
    ) -> Result<Zone> {
        let zone_name = self.zone_of(guard);
        let zone = Zone::new(SoaRecord::new(zone_name, fields, initial_serial(now)));

        match self.store.create_new(&Self::key(zone_name), &zone.render()) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                return Err(ZoneError::ZoneExists(zone_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Created zone file for {} with serial {}", zone_name, zone.serial());
        Ok(zone)
    }

    pub fn delete(&self, guard: &ZoneGuard<'_>) -> Result<()> {
        let zone = self.zone_of(guard);
        if !self.store.remove(&Self::key(zone))? {
            return Err(ZoneError::ZoneNotFound(zone.to_string()));
        }
        info!("Removed zone file for {}", zone);
        Ok(())
    }

    /// Parse the current contents of `zone`.
    ///
    /// Writes replace whole files, so this sees a complete revision without
    /// taking the zone lock.
    pub fn read(&self, zone: &str) -> Result<Zone> {
        self.load(zone)
    }

    /// Append `record` and bump the serial; returns the new serial
    pub fn add_record(&self, guard: &ZoneGuard<'_>, record: AddressRecord) -> Result<u32> {
        let zone_name = self.zone_of(guard);
        let mut zone = self.load(zone_name)?;

        if self.policy.duplicate_hosts == DuplicateHostPolicy::Reject && zone.has_host(&record.name)
        {
            return Err(ZoneError::DuplicateHost {
                zone: zone_name.to_string(),
                host: record.name,
            });
        }

        zone.soa.serial = bump_serial(&zone)?;
        debug!(
            "Adding {} -> {} to zone {} (serial {})",
            record.name, record.ip, zone_name, zone.soa.serial
        );
        zone.records.push(record);

        self.save(&zone)?;
        Ok(zone.soa.serial)
    }

    /// Remove every record named `host` and bump the serial
    pub fn delete_record(&self, guard: &ZoneGuard<'_>, host: &str) -> Result<RecordDeletion> {
        let zone_name = self.zone_of(guard);
        let mut zone = self.load(zone_name)?;

        let before = zone.records.len();
        zone.records.retain(|r| r.name != host);
        let removed = before - zone.records.len();

        if removed == 0 && !self.policy.bump_serial_on_noop_delete {
            debug!("No record named {} in zone {}, leaving file as is", host, zone_name);
            return Ok(RecordDeletion {
                removed,
                serial: zone.soa.serial,
            });
        }

        zone.soa.serial = bump_serial(&zone)?;
        debug!(
            "Removed {} record(s) named {} from zone {} (serial {})",
            removed, host, zone_name, zone.soa.serial
        );

        self.save(&zone)?;
        Ok(RecordDeletion {
            removed,
            serial: zone.soa.serial,
        })
    }

    /// Names of all zones with a file in the store
    pub fn zones(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|key| {
                key.strip_suffix(constants::ZONE_FILE_SUFFIX)
                    .map(str::to_string)
            })
            .collect())
    }

    fn zone_of<'g>(&self, guard: &'g ZoneGuard<'_>) -> &'g str {
        debug_assert!(guard.belongs_to(&self.locks), "guard from another lock table");
        guard.key()
    }

    fn load(&self, zone: &str) -> Result<Zone> {
        let key = Self::key(zone);
        let too_large = |len: u64| len > constants::MAX_ZONE_FILE_SIZE as u64;

        match self.store.size(&key)? {
            None => return Err(ZoneError::ZoneNotFound(zone.to_string())),
            Some(len) if too_large(len) => {
                return Err(ZoneError::FileTooLarge(zone.to_string()));
            }
            Some(_) => {}
        }

        let contents = self
            .store
            .read(&key)?
            .ok_or_else(|| ZoneError::ZoneNotFound(zone.to_string()))?;

        // The file may have grown since it was measured
        if too_large(contents.len() as u64) {
            return Err(ZoneError::FileTooLarge(zone.to_string()));
        }

        Zone::parse(zone, &contents)
    }

    fn save(&self, zone: &Zone) -> Result<()> {
        let contents = zone.render();
        if contents.len() > constants::MAX_ZONE_FILE_SIZE {
            return Err(ZoneError::FileTooLarge(zone.origin().to_string()));
        }
        self.store.write(&Self::key(zone.origin()), &contents)?;
        Ok(())
    }
}

fn bump_serial(zone: &Zone) -> Result<u32> {
    zone.soa
        .next_serial()
        .ok_or_else(|| ZoneError::SerialExhausted(zone.origin().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn zone_file(policy: RecordPolicy) -> (Arc<MemoryStore>, ZoneFile) {
        let store = Arc::new(MemoryStore::new());
        let zones = ZoneFile::new(store.clone(), Duration::from_millis(50), policy);
        (store, zones)
    }

    fn record(name: &str, last: u8) -> AddressRecord {
        AddressRecord::new(name, Ipv4Addr::new(10, 0, 0, last), 3600)
    }

    #[test]
    fn test_create_writes_only_soa() {
        let (store, zones) = zone_file(RecordPolicy::default());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let guard = zones.lock("example.com").unwrap();
        let zone = zones.create_at(&guard, &SoaFields::default(), &at).unwrap();

        assert_eq!(zone.serial(), 2024010112);
        assert_eq!(
            store.read("example.com.db").unwrap().unwrap(),
            "example.com. IN SOA ns1.primaryserver.com. admin.netedge.com. 2024010112 7200 3600 1209600 3600\n"
        );
    }

    #[test]
    fn test_create_existing_fails() {
        let (store, zones) = zone_file(RecordPolicy::default());
        store.write("example.com.db", "sentinel").unwrap();

        let guard = zones.lock("example.com").unwrap();
        let err = zones.create(&guard, &SoaFields::default()).unwrap_err();

        assert!(matches!(err, ZoneError::ZoneExists(_)));
        assert_eq!(store.read("example.com.db").unwrap().unwrap(), "sentinel");
    }

    #[test]
    fn test_missing_zone_is_not_found() {
        let (_, zones) = zone_file(RecordPolicy::default());
        let guard = zones.lock("missing.com").unwrap();

        assert!(matches!(
            zones.add_record(&guard, record("www.missing.com", 1)),
            Err(ZoneError::ZoneNotFound(_))
        ));
        assert!(matches!(
            zones.delete_record(&guard, "www.missing.com"),
            Err(ZoneError::ZoneNotFound(_))
        ));
        assert!(matches!(zones.delete(&guard), Err(ZoneError::ZoneNotFound(_))));
        assert!(matches!(
            zones.read("missing.com"),
            Err(ZoneError::ZoneNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_hosts_rejected_without_write() {
        let (store, zones) = zone_file(RecordPolicy::default());
        let guard = zones.lock("example.com").unwrap();
        zones.create(&guard, &SoaFields::default()).unwrap();
        zones.add_record(&guard, record("www.example.com", 1)).unwrap();
        let before = store.read("example.com.db").unwrap();

        let err = zones
            .add_record(&guard, record("www.example.com", 2))
            .unwrap_err();

        assert!(matches!(err, ZoneError::DuplicateHost { .. }));
        assert_eq!(store.read("example.com.db").unwrap(), before);
    }

    #[test]
    fn test_duplicate_hosts_allowed() {
        let policy = RecordPolicy {
            duplicate_hosts: DuplicateHostPolicy::Allow,
            ..Default::default()
        };
        let (_, zones) = zone_file(policy);
        let guard = zones.lock("example.com").unwrap();
        zones.create(&guard, &SoaFields::default()).unwrap();
        zones.add_record(&guard, record("www.example.com", 1)).unwrap();
        zones.add_record(&guard, record("www.example.com", 2)).unwrap();

        let deletion = zones.delete_record(&guard, "www.example.com").unwrap();
        assert_eq!(deletion.removed, 2);
        assert!(zones.read("example.com").unwrap().records.is_empty());
    }

    #[test]
    fn test_noop_delete_without_bump_leaves_file() {
        let policy = RecordPolicy {
            bump_serial_on_noop_delete: false,
            ..Default::default()
        };
        let (store, zones) = zone_file(policy);
        let guard = zones.lock("example.com").unwrap();
        let created = zones.create(&guard, &SoaFields::default()).unwrap();
        let before = store.read("example.com.db").unwrap();

        let deletion = zones.delete_record(&guard, "ghost.example.com").unwrap();

        assert_eq!(deletion.removed, 0);
        assert_eq!(deletion.serial, created.serial());
        assert_eq!(store.read("example.com.db").unwrap(), before);
    }

    #[test]
    fn test_serial_exhaustion() {
        let (store, zones) = zone_file(RecordPolicy::default());
        store
            .write(
                "example.com.db",
                &format!(
                    "example.com. IN SOA ns1.example.com. admin.example.com. {} 1 1 1 1\n",
                    u32::MAX
                ),
            )
            .unwrap();

        let guard = zones.lock("example.com").unwrap();
        assert!(matches!(
            zones.add_record(&guard, record("www.example.com", 1)),
            Err(ZoneError::SerialExhausted(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_not_rewritten() {
        let (store, zones) = zone_file(RecordPolicy::default());
        store.write("example.com.db", "garbage\n").unwrap();

        let guard = zones.lock("example.com").unwrap();
        assert!(matches!(
            zones.add_record(&guard, record("www.example.com", 1)),
            Err(ZoneError::Corrupt { line: 1, .. })
        ));
        assert_eq!(store.read("example.com.db").unwrap().unwrap(), "garbage\n");
    }

    #[test]
    fn test_lock_times_out() {
        let (_, zones) = zone_file(RecordPolicy::default());
        let _held = zones.lock("example.com").unwrap();

        assert!(matches!(zones.lock("example.com"), Err(ZoneError::Busy(_))));
        assert!(zones.lock("other.com").is_ok());
    }

    /// Reports an oversized zone file and refuses to read it
    struct OversizedStore(MemoryStore);

    impl TextStore for OversizedStore {
        fn read(&self, key: &str) -> crate::store::Result<Option<String>> {
            panic!("{} read despite its size", key)
        }
        fn write(&self, key: &str, contents: &str) -> crate::store::Result<()> {
            self.0.write(key, contents)
        }
        fn create_new(&self, key: &str, contents: &str) -> crate::store::Result<()> {
            self.0.create_new(key, contents)
        }
        fn remove(&self, key: &str) -> crate::store::Result<bool> {
            self.0.remove(key)
        }
        fn size(&self, _key: &str) -> crate::store::Result<Option<u64>> {
            Ok(Some(constants::MAX_ZONE_FILE_SIZE as u64 + 1))
        }
        fn exists(&self, key: &str) -> crate::store::Result<bool> {
            self.0.exists(key)
        }
        fn keys(&self) -> crate::store::Result<Vec<String>> {
            self.0.keys()
        }
    }

    #[test]
    fn test_oversized_file_is_not_read() {
        let zones = ZoneFile::new(
            Arc::new(OversizedStore(MemoryStore::new())),
            Duration::from_millis(50),
            RecordPolicy::default(),
        );

        assert!(matches!(
            zones.read("example.com"),
            Err(ZoneError::FileTooLarge(_))
        ));

        let guard = zones.lock("example.com").unwrap();
        assert!(matches!(
            zones.add_record(&guard, record("www.example.com", 1)),
            Err(ZoneError::FileTooLarge(_))
        ));
    }

    #[test]
    fn test_zones_lists_db_keys() {
        let (store, zones) = zone_file(RecordPolicy::default());
        store.write("Corefile", "").unwrap();
        store.write("a.com.db", "").unwrap();
        store.write("b.org.db", "").unwrap();

        assert_eq!(zones.zones().unwrap(), vec!["a.com", "b.org"]);
    }
}
