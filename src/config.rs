use crate::error::ConfigError;
use crate::service::ReconcileMode;
use crate::validation::{MAX_TTL, check_ttl, normalize_domain_name, normalize_rname};
use crate::zone::{DuplicateHostPolicy, SoaFields};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Address the HTTP API listens on
    pub bind_addr: SocketAddr,

    /// Path prefix every API route is mounted under
    pub base_path: String,

    /// Directory holding the Corefile and zone files
    pub data_dir: PathBuf,

    /// File name of the Corefile inside `data_dir`
    pub corefile_name: String,

    /// Directory the nameserver reads zone files from, written into `file` directives
    pub nameserver_zone_dir: String,

    /// Port new zones are served on
    pub zone_port: u16,

    /// Interval the nameserver polls zone files at (`reload` directive)
    pub reload_interval: String,

    /// Corefile snippet imported by every zone block
    pub snippet: String,

    /// SOA values for new zones when the request does not override them
    pub soa_defaults: SoaFields,

    /// TTL for records added without one
    pub default_record_ttl: u32,

    /// Longest wait for a zone or registry lock before answering busy
    pub lock_timeout: Duration,

    pub duplicate_hosts: DuplicateHostPolicy,

    /// Whether deleting a host that has no records still bumps the serial
    pub bump_serial_on_noop_delete: bool,

    /// Consistency pass run before serving (None = skip)
    pub reconcile_on_startup: Option<ReconcileMode>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8082)),
            base_path: "/dns_support/v1".to_string(),
            data_dir: PathBuf::from("/home/api/coredns"),
            corefile_name: "Corefile".to_string(),
            nameserver_zone_dir: "/etc/coredns".to_string(),
            zone_port: 1053,
            reload_interval: "5s".to_string(),
            snippet: "snip_base".to_string(),
            soa_defaults: SoaFields::default(),
            default_record_ttl: 3600,
            lock_timeout: Duration::from_secs(5),
            duplicate_hosts: DuplicateHostPolicy::Reject,
            bump_serial_on_noop_delete: true,
            reconcile_on_startup: Some(ReconcileMode::Report),
        }
    }
}

impl ApiConfig {
    /// Create an ApiConfig from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the TOML file at `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            let content = std::fs::read_to_string(path)?;
            let toml_value: toml::Value = toml::from_str(&content)?;
            config.apply_partial_update(&toml_value)?;
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `ZONEKEEPER_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(bind_addr) = std::env::var("ZONEKEEPER_BIND_ADDR") {
            self.bind_addr = bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind_addr))?;
        }

        if let Ok(base_path) = std::env::var("ZONEKEEPER_BASE_PATH") {
            self.base_path = base_path;
        }

        if let Ok(data_dir) = std::env::var("ZONEKEEPER_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(corefile) = std::env::var("ZONEKEEPER_COREFILE") {
            self.corefile_name = corefile;
        }

        if let Ok(zone_dir) = std::env::var("ZONEKEEPER_NAMESERVER_ZONE_DIR") {
            self.nameserver_zone_dir = zone_dir;
        }

        if let Ok(port) = std::env::var("ZONEKEEPER_ZONE_PORT") {
            self.zone_port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }

        if let Ok(interval) = std::env::var("ZONEKEEPER_RELOAD_INTERVAL") {
            self.reload_interval = interval;
        }

        if let Ok(snippet) = std::env::var("ZONEKEEPER_SNIPPET") {
            self.snippet = snippet;
        }

        if let Ok(ttl) = std::env::var("ZONEKEEPER_DEFAULT_RECORD_TTL") {
            self.default_record_ttl = parse_number("default_record_ttl", &ttl)?;
        }

        if let Ok(timeout) = std::env::var("ZONEKEEPER_LOCK_TIMEOUT") {
            self.lock_timeout = parse_duration(&timeout)?;
        }

        if let Ok(policy) = std::env::var("ZONEKEEPER_DUPLICATE_HOSTS") {
            self.duplicate_hosts = policy.parse().map_err(|_| ConfigError::InvalidValue {
                field: "duplicate_hosts".to_string(),
                value: policy,
            })?;
        }

        if let Ok(bump) = std::env::var("ZONEKEEPER_BUMP_SERIAL_ON_NOOP_DELETE") {
            self.bump_serial_on_noop_delete = parse_bool(&bump, true);
        }

        if let Ok(mode) = std::env::var("ZONEKEEPER_RECONCILE_ON_STARTUP") {
            self.reconcile_on_startup = parse_reconcile_mode(&mode)?;
        }

        Ok(())
    }

    /// Apply the keys present in a TOML document, leaving the rest untouched.
    ///
    /// SOA defaults live in a `[soa]` table.
    pub fn apply_partial_update(&mut self, value: &toml::Value) -> Result<(), ConfigError> {
        let table = value
            .as_table()
            .ok_or_else(|| ConfigError::ParseError("expected a TOML table".to_string()))?;

        for (key, item) in table {
            match key.as_str() {
                "bind_addr" => {
                    let addr = expect_str(key, item)?;
                    self.bind_addr = addr
                        .parse()
                        .map_err(|_| ConfigError::InvalidBindAddress(addr.to_string()))?;
                }
                "base_path" => self.base_path = expect_str(key, item)?.to_string(),
                "data_dir" => self.data_dir = PathBuf::from(expect_str(key, item)?),
                "corefile_name" => self.corefile_name = expect_str(key, item)?.to_string(),
                "nameserver_zone_dir" => {
                    self.nameserver_zone_dir = expect_str(key, item)?.to_string()
                }
                "zone_port" => {
                    self.zone_port = u16::try_from(expect_int(key, item)?)
                        .map_err(|_| ConfigError::InvalidPort(item.to_string()))?
                }
                "reload_interval" => self.reload_interval = expect_str(key, item)?.to_string(),
                "snippet" => self.snippet = expect_str(key, item)?.to_string(),
                "default_record_ttl" => self.default_record_ttl = expect_u32(key, item)?,
                "lock_timeout" => self.lock_timeout = parse_duration(expect_str(key, item)?)?,
                "duplicate_hosts" => {
                    let policy = expect_str(key, item)?;
                    self.duplicate_hosts =
                        policy.parse().map_err(|_| ConfigError::InvalidValue {
                            field: key.clone(),
                            value: policy.to_string(),
                        })?;
                }
                "bump_serial_on_noop_delete" => {
                    self.bump_serial_on_noop_delete = item.as_bool().ok_or_else(|| invalid(key, item))?
                }
                "reconcile_on_startup" => {
                    self.reconcile_on_startup = parse_reconcile_mode(expect_str(key, item)?)?
                }
                "soa" => self.apply_soa(item)?,
                other => warn!("Ignoring unknown configuration key: {}", other),
            }
        }

        Ok(())
    }

    fn apply_soa(&mut self, value: &toml::Value) -> Result<(), ConfigError> {
        let table = value.as_table().ok_or_else(|| invalid("soa", value))?;
        let soa = &mut self.soa_defaults;

        for (key, item) in table {
            match key.as_str() {
                "mname" => {
                    soa.mname = normalize_domain_name(expect_str(key, item)?)
                        .map_err(|_| invalid("soa.mname", item))?
                }
                "rname" => {
                    soa.rname =
                        normalize_rname(expect_str(key, item)?).map_err(|_| invalid("soa.rname", item))?
                }
                "refresh" => soa.refresh = expect_u32(key, item)?,
                "retry" => soa.retry = expect_u32(key, item)?,
                "expire" => soa.expire = expect_u32(key, item)?,
                "ttl" => soa.ttl = expect_u32(key, item)?,
                other => warn!("Ignoring unknown configuration key: soa.{}", other),
            }
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/')
                || (self.base_path.len() > 1 && self.base_path.ends_with('/')))
        {
            return Err(ConfigError::InvalidBasePath(self.base_path.clone()));
        }

        if self.zone_port == 0 {
            return Err(ConfigError::InvalidPort("0".to_string()));
        }

        // The Corefile shares the directory with zone files
        if crate::store::check_key(&self.corefile_name).is_err()
            || self.corefile_name.ends_with(crate::zone::constants::ZONE_FILE_SUFFIX)
        {
            return Err(ConfigError::InvalidValue {
                field: "corefile_name".to_string(),
                value: self.corefile_name.clone(),
            });
        }

        if !self.nameserver_zone_dir.starts_with('/')
            || self
                .nameserver_zone_dir
                .contains(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '#' | '"'))
        {
            return Err(ConfigError::InvalidValue {
                field: "nameserver_zone_dir".to_string(),
                value: self.nameserver_zone_dir.clone(),
            });
        }

        if self.snippet.is_empty()
            || self
                .snippet
                .contains(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '#' | '"'))
        {
            return Err(ConfigError::InvalidValue {
                field: "snippet".to_string(),
                value: self.snippet.clone(),
            });
        }

        parse_duration(&self.reload_interval)?;

        if self.lock_timeout.is_zero() || self.lock_timeout > Duration::from_secs(300) {
            return Err(ConfigError::InvalidDuration(
                "Lock timeout must be between 1ms and 300 seconds".to_string(),
            ));
        }

        // RFC 2181: TTLs are limited to 2^31 - 1
        if self.default_record_ttl > MAX_TTL {
            return Err(ConfigError::InvalidValue {
                field: "default_record_ttl".to_string(),
                value: self.default_record_ttl.to_string(),
            });
        }

        self.validate_soa_defaults()
    }

    /// SOA defaults are written into every new zone file unchecked, so they
    /// must already be in canonical form
    fn validate_soa_defaults(&self) -> Result<(), ConfigError> {
        let soa = &self.soa_defaults;
        let names = [
            ("soa.mname", &soa.mname, normalize_domain_name(&soa.mname)),
            ("soa.rname", &soa.rname, normalize_rname(&soa.rname)),
        ];
        for (field, value, normalized) in names {
            if normalized.as_ref() != Ok(value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }

        let timers = [
            ("soa.refresh", soa.refresh),
            ("soa.retry", soa.retry),
            ("soa.expire", soa.expire),
            ("soa.ttl", soa.ttl),
        ];
        for (field, value) in timers {
            check_ttl(field, value).map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            })?;
        }

        Ok(())
    }
}

/// Parse a boolean from a string, with a default value for invalid input
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse `500ms`, `5s`, `2m` or a bare number of seconds
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => s.split_at(split),
        None => (s, "s"),
    };
    let value: u64 = number.parse().map_err(|_| invalid())?;

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };

    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}

fn parse_reconcile_mode(s: &str) -> Result<Option<ReconcileMode>, ConfigError> {
    match s.to_lowercase().as_str() {
        "off" | "none" | "false" => Ok(None),
        other => other
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: "reconcile_on_startup".to_string(),
                value: s.to_string(),
            }),
    }
}

fn parse_number(field: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn invalid(field: &str, value: &toml::Value) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn expect_str<'a>(field: &str, value: &'a toml::Value) -> Result<&'a str, ConfigError> {
    value.as_str().ok_or_else(|| invalid(field, value))
}

fn expect_int(field: &str, value: &toml::Value) -> Result<i64, ConfigError> {
    value.as_integer().ok_or_else(|| invalid(field, value))
}

fn expect_u32(field: &str, value: &toml::Value) -> Result<u32, ConfigError> {
    u32::try_from(expect_int(field, value)?).map_err(|_| invalid(field, value))
}
