//! Zone lifecycle orchestration.
//!
//! A zone is live when it has both a zone file and a Corefile entry. The
//! service is the only place that touches both, and it always does so while
//! holding the zone's lock (zone lock first, registry lock second) so the two
//! artifacts move together:
//!
//! - create writes the zone file, then registers it
//! - delete unregisters first, then removes the file
//!
//! A failure between the two steps leaves a documented half state that the
//! next delete, create or [`ZoneService::reconcile`] run repairs.

use crate::config::ApiConfig;
use crate::error::{Result, ServiceError};
use crate::registry::{BlockLayout, EntryState, RegistryEntry, ZoneRegistry};
use crate::store::TextStore;
use crate::validation::{
    MAX_DOMAIN_LENGTH, ValidationError, check_ttl, normalize_domain_name, normalize_host_name,
    normalize_rname, normalize_zone_name,
};
use crate::zone::{
    AddressRecord, RecordDeletion, RecordPolicy, SoaFields, Zone, ZoneFile, qualify_host,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Optional SOA values supplied when creating a zone; unset fields take the
/// configured defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoaOverrides {
    pub mname: Option<String>,
    pub rname: Option<String>,
    pub refresh: Option<u32>,
    pub retry: Option<u32>,
    pub expire: Option<u32>,
    pub ttl: Option<u32>,
}

impl SoaOverrides {
    pub fn resolve(&self, defaults: &SoaFields) -> std::result::Result<SoaFields, ValidationError> {
        let mname = match &self.mname {
            Some(name) => normalize_domain_name(name)?,
            None => defaults.mname.clone(),
        };

        let rname = match &self.rname {
            Some(name) => normalize_rname(name)?,
            None => defaults.rname.clone(),
        };

        Ok(SoaFields {
            mname,
            rname,
            refresh: check_ttl("refresh", self.refresh.unwrap_or(defaults.refresh))?,
            retry: check_ttl("retry", self.retry.unwrap_or(defaults.retry))?,
            expire: check_ttl("expire", self.expire.unwrap_or(defaults.expire))?,
            ttl: check_ttl("ttl", self.ttl.unwrap_or(defaults.ttl))?,
        })
    }
}

/// Body of an add-record request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordRequest {
    /// Host name, relative to the zone or fully qualified
    pub name: String,
    pub ip: Ipv4Addr,
    pub ttl: Option<u32>,
}

/// How [`ZoneService::reconcile`] treats inconsistencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Log what is out of sync, change nothing
    Report,
    /// Drop entries without files and register files without entries
    Repair,
}

impl FromStr for ReconcileMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "report" => Ok(ReconcileMode::Report),
            "repair" => Ok(ReconcileMode::Repair),
            other => Err(format!("Unknown reconcile mode: {}", other)),
        }
    }
}

/// Differences between the Corefile and the zone files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Registry entries whose zone file is missing
    pub dangling_entries: Vec<RegistryEntry>,
    /// Zone files no registry entry points at
    pub unserved_zones: Vec<String>,
    /// Whether the differences were repaired
    pub repaired: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling_entries.is_empty() && self.unserved_zones.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Port new zones are served on
    pub zone_port: u16,
    pub soa_defaults: SoaFields,
    pub default_record_ttl: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            zone_port: 1053,
            soa_defaults: SoaFields::default(),
            default_record_ttl: crate::zone::constants::DEFAULT_TTL,
        }
    }
}

impl From<&ApiConfig> for ServiceOptions {
    fn from(config: &ApiConfig) -> Self {
        Self {
            zone_port: config.zone_port,
            soa_defaults: config.soa_defaults.clone(),
            default_record_ttl: config.default_record_ttl,
        }
    }
}

pub struct ZoneService {
    zones: ZoneFile,
    registry: ZoneRegistry,
    options: ServiceOptions,
}

impl ZoneService {
    pub fn new(zones: ZoneFile, registry: ZoneRegistry, options: ServiceOptions) -> Self {
        Self {
            zones,
            registry,
            options,
        }
    }

    /// Build a service over `store` with everything else taken from `config`
    pub fn from_config(config: &ApiConfig, store: Arc<dyn TextStore>) -> Self {
        let policy = RecordPolicy {
            duplicate_hosts: config.duplicate_hosts,
            bump_serial_on_noop_delete: config.bump_serial_on_noop_delete,
        };
        let layout = BlockLayout {
            snippet: config.snippet.clone(),
            zone_dir: config.nameserver_zone_dir.clone(),
            reload_interval: config.reload_interval.clone(),
        };

        Self::new(
            ZoneFile::new(store.clone(), config.lock_timeout, policy),
            ZoneRegistry::new(store, config.corefile_name.clone(), layout, config.lock_timeout),
            ServiceOptions::from(config),
        )
    }

    /// Service over `store` with default settings
    pub fn with_defaults(store: Arc<dyn TextStore>, lock_timeout: Duration) -> Self {
        Self::new(
            ZoneFile::new(store.clone(), lock_timeout, RecordPolicy::default()),
            ZoneRegistry::new(store, "Corefile", BlockLayout::default(), lock_timeout),
            ServiceOptions::default(),
        )
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Create `zone` with an SOA-only zone file and register it
    pub fn create_zone(&self, zone: &str, overrides: &SoaOverrides) -> Result<Zone> {
        let zone = normalize_zone_name(zone)?;
        let fields = overrides.resolve(&self.options.soa_defaults)?;
        let port = self.options.zone_port;

        let guard = self.zones.lock(&zone)?;
        if self.zones.exists(&guard)? {
            return Err(ServiceError::AlreadyExists(format!(
                "Zone {} already exists",
                zone
            )));
        }

        let dangling = match self.registry.entry_state(&zone, port)? {
            EntryState::Absent => false,
            EntryState::Zone => true,
            EntryState::Foreign => {
                error!(
                    "Corefile already has a {}:{} block that does not serve the zone file",
                    zone, port
                );
                return Err(ServiceError::Internal(format!(
                    "Corefile already has a server block for {}:{}",
                    zone, port
                )));
            }
        };
        let created = self.zones.create(&guard, &fields)?;

        if dangling {
            warn!(
                "Reusing existing registry entry for {}:{} left by an earlier delete",
                zone, port
            );
        } else if let Err(e) = self.registry.add_entry(&zone, port) {
            error!(
                "Zone {} has a zone file but no registry entry: {}",
                zone, e
            );
            return Err(ServiceError::Internal(format!(
                "Zone file for {} was written but registering it failed: {}",
                zone, e
            )));
        }

        info!("Zone {} created with serial {}", zone, created.serial());
        Ok(created)
    }

    /// Unregister `zone` and remove its zone file.
    ///
    /// Either half alone is enough for the delete to proceed, so rerunning a
    /// delete that failed halfway finishes it.
    pub fn delete_zone(&self, zone: &str) -> Result<()> {
        let zone = normalize_zone_name(zone)?;
        let port = self.options.zone_port;

        let guard = self.zones.lock(&zone)?;
        let has_file = self.zones.exists(&guard)?;

        let unregistered = self.registry.remove_entry(&zone, port).map_err(|e| {
            error!("Failed to unregister zone {}: {}", zone, e);
            ServiceError::from(e)
        })?;

        if !has_file {
            if !unregistered {
                return Err(ServiceError::NotFound(format!("Zone {} not found", zone)));
            }
            warn!("Removed registry entry for {} which had no zone file", zone);
            return Ok(());
        }

        if !unregistered {
            warn!("Zone {} had a zone file but no registry entry", zone);
        }

        if let Err(e) = self.zones.delete(&guard) {
            error!(
                "Zone {} is unregistered but its zone file remains, needs reconciliation: {}",
                zone, e
            );
            return Err(ServiceError::Internal(format!(
                "Zone {} was unregistered but removing its zone file failed: {}",
                zone, e
            )));
        }

        info!("Zone {} deleted", zone);
        Ok(())
    }

    /// Append an address record; returns the zone's new serial
    pub fn add_record(&self, zone: &str, request: &RecordRequest) -> Result<u32> {
        let zone = normalize_zone_name(zone)?;
        let host = self.qualify(&zone, &request.name)?;
        let ttl = check_ttl("ttl", request.ttl.unwrap_or(self.options.default_record_ttl))?;

        let guard = self.zones.lock(&zone)?;
        let serial = self
            .zones
            .add_record(&guard, AddressRecord::new(host.clone(), request.ip, ttl))?;

        info!(
            "Added {} -> {} to zone {} (serial {})",
            host, request.ip, zone, serial
        );
        Ok(serial)
    }

    /// Remove every record for `host` from `zone`
    pub fn delete_record(&self, zone: &str, host: &str) -> Result<RecordDeletion> {
        let zone = normalize_zone_name(zone)?;
        let host = self.qualify(&zone, host)?;

        let guard = self.zones.lock(&zone)?;
        let deletion = self.zones.delete_record(&guard, &host)?;

        if deletion.removed == 0 {
            info!(
                "No records for {} in zone {} (serial {})",
                host, zone, deletion.serial
            );
        } else {
            info!(
                "Deleted {} record(s) for {} from zone {} (serial {})",
                deletion.removed, host, zone, deletion.serial
            );
        }
        Ok(deletion)
    }

    pub fn read_zone(&self, zone: &str) -> Result<Zone> {
        let zone = normalize_zone_name(zone)?;
        Ok(self.zones.read(&zone)?)
    }

    /// Zones currently registered in the Corefile
    pub fn list_zones(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.registry.entries()?)
    }

    /// Compare registry entries with zone files and optionally repair the
    /// differences. Each repair step re-checks its zone under the zone lock,
    /// so concurrent creates and deletes are never undone.
    pub fn reconcile(&self, mode: ReconcileMode) -> Result<ReconcileReport> {
        let entries = self.registry.entries()?;
        let files: BTreeSet<String> = self.zones.zones()?.into_iter().collect();
        let served: BTreeSet<&str> = entries.iter().map(|e| e.zone.as_str()).collect();

        let mut report = ReconcileReport {
            dangling_entries: entries
                .iter()
                .filter(|e| !files.contains(&e.zone))
                .cloned()
                .collect(),
            unserved_zones: files
                .iter()
                .filter(|zone| !served.contains(zone.as_str()))
                .cloned()
                .collect(),
            repaired: false,
        };

        for entry in &report.dangling_entries {
            warn!(
                "Registry entry {}:{} has no zone file",
                entry.zone, entry.port
            );
        }
        for zone in &report.unserved_zones {
            warn!("Zone file for {} has no registry entry", zone);
        }

        if mode == ReconcileMode::Repair && !report.is_consistent() {
            self.repair(&report)?;
            report.repaired = true;
        }

        Ok(report)
    }

    fn repair(&self, report: &ReconcileReport) -> Result<()> {
        for entry in &report.dangling_entries {
            let guard = self.zones.lock(&entry.zone)?;
            if self.zones.exists(&guard)? {
                continue;
            }
            if self.registry.remove_entry(&entry.zone, entry.port)? {
                info!("Removed dangling registry entry {}:{}", entry.zone, entry.port);
            }
        }

        for zone in &report.unserved_zones {
            match normalize_zone_name(zone) {
                Ok(name) if name == *zone => {}
                _ => {
                    warn!("Skipping zone file with unusable name {}", zone);
                    continue;
                }
            }

            let guard = self.zones.lock(zone)?;
            if !self.zones.exists(&guard)? {
                continue;
            }
            match self.registry.entry_state(zone, self.options.zone_port)? {
                EntryState::Absent => {}
                EntryState::Zone => continue,
                EntryState::Foreign => {
                    warn!(
                        "Not registering {}: the Corefile has a different block for {}:{}",
                        zone, zone, self.options.zone_port
                    );
                    continue;
                }
            }
            self.registry.add_entry(zone, self.options.zone_port)?;
            info!("Registered unserved zone {}", zone);
        }

        Ok(())
    }

    fn qualify(&self, zone: &str, host: &str) -> Result<String> {
        let host = qualify_host(zone, &normalize_host_name(host)?);
        if host.len() > MAX_DOMAIN_LENGTH {
            return Err(ValidationError::DomainNameTooLong(host.len()).into());
        }
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_fill_defaults() {
        let overrides = SoaOverrides {
            rname: Some("hostmaster@example.com".to_string()),
            refresh: Some(600),
            ..Default::default()
        };

        let fields = overrides.resolve(&SoaFields::default()).unwrap();
        assert_eq!(fields.rname, "hostmaster.example.com");
        assert_eq!(fields.refresh, 600);
        assert_eq!(fields.mname, "ns1.primaryserver.com");
        assert_eq!(fields.expire, 1_209_600);
    }

    #[test]
    fn test_overrides_validate_names() {
        let overrides = SoaOverrides {
            mname: Some("bad name".to_string()),
            ..Default::default()
        };
        assert!(overrides.resolve(&SoaFields::default()).is_err());
    }

    #[test]
    fn test_overrides_bound_timers() {
        let overrides = SoaOverrides {
            expire: Some(u32::MAX),
            ..Default::default()
        };
        assert!(matches!(
            overrides.resolve(&SoaFields::default()),
            Err(ValidationError::ValueTooLarge { .. })
        ));

        let overrides = SoaOverrides {
            ttl: Some(i32::MAX as u32),
            ..Default::default()
        };
        assert_eq!(
            overrides.resolve(&SoaFields::default()).unwrap().ttl,
            i32::MAX as u32
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<SoaOverrides>(r#"{"serial": 5}"#).is_err());
        assert!(
            serde_json::from_str::<RecordRequest>(r#"{"name":"www","ip":"10.0.0.1","type":"A"}"#)
                .is_err()
        );

        let request: RecordRequest =
            serde_json::from_str(r#"{"name":"www","ip":"10.0.0.1"}"#).unwrap();
        assert_eq!(request.ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(request.ttl, None);
    }

    #[test]
    fn test_reconcile_mode_parsing() {
        assert_eq!("REPAIR".parse::<ReconcileMode>(), Ok(ReconcileMode::Repair));
        assert_eq!("report".parse::<ReconcileMode>(), Ok(ReconcileMode::Report));
        assert!("fix".parse::<ReconcileMode>().is_err());
    }
}
