use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Administrative SOA values supplied when a zone is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaFields {
    /// Primary name server for the zone
    pub mname: String,
    /// Responsible party, `@` written as `.`
    pub rname: String,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    /// Negative-caching TTL
    pub ttl: u32,
}

impl Default for SoaFields {
    fn default() -> Self {
        Self {
            mname: "ns1.primaryserver.com".to_string(),
            rname: "admin.netedge.com".to_string(),
            refresh: 7200,
            retry: 3600,
            expire: 1_209_600,
            ttl: 3600,
        }
    }
}

/// Start-of-authority record, always the first line of a zone file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoaRecord {
    /// Zone name without trailing dot
    pub name: String,
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub ttl: u32,
}

impl SoaRecord {
    pub fn new(name: &str, fields: &SoaFields, serial: u32) -> Self {
        Self {
            name: name.to_string(),
            mname: fields.mname.clone(),
            rname: fields.rname.clone(),
            serial,
            refresh: fields.refresh,
            retry: fields.retry,
            expire: fields.expire,
            ttl: fields.ttl,
        }
    }

    /// Parse `<name>. IN SOA <mname>. <rname>. <serial> <refresh> <retry> <expire> <ttl>`
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 10 {
            return Err(format!("SOA record requires 10 fields, got {}", parts.len()));
        }

        expect_literal(parts[1], "IN")?;
        expect_literal(parts[2], "SOA")?;

        Ok(Self {
            name: absolute_name(parts[0])?,
            mname: absolute_name(parts[3])?,
            rname: absolute_name(parts[4])?,
            serial: parse_u32("serial", parts[5])?,
            refresh: parse_u32("refresh", parts[6])?,
            retry: parse_u32("retry", parts[7])?,
            expire: parse_u32("expire", parts[8])?,
            ttl: parse_u32("ttl", parts[9])?,
        })
    }

    /// Serial for the next revision, `None` once `u32::MAX` is reached
    pub fn next_serial(&self) -> Option<u32> {
        self.serial.checked_add(1)
    }
}

impl fmt::Display for SoaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. IN SOA {}. {}. {} {} {} {} {}",
            self.name,
            self.mname,
            self.rname,
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.ttl
        )
    }
}

/// An `IN A` record; `name` is the record's identifying key inside its zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    /// Fully qualified host name without trailing dot
    pub name: String,
    pub ttl: u32,
    pub ip: Ipv4Addr,
}

impl AddressRecord {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.into(),
            ttl,
            ip,
        }
    }

    /// Parse `<name>. <ttl> IN A <ip>`
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(format!("A record requires 5 fields, got {}", parts.len()));
        }

        expect_literal(parts[2], "IN")?;
        expect_literal(parts[3], "A")?;

        let ip: Ipv4Addr = parts[4]
            .parse()
            .map_err(|_| format!("Invalid IPv4 address: {}", parts[4]))?;

        Ok(Self {
            name: absolute_name(parts[0])?,
            ttl: parse_u32("ttl", parts[1])?,
            ip,
        })
    }
}

impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {} IN A {}", self.name, self.ttl, self.ip)
    }
}

/// Initial serial for a zone created at `now`: the decimal `YYYYMMDDHH`
pub fn initial_serial<Tz: TimeZone>(now: &DateTime<Tz>) -> u32 {
    now.year() as u32 * 1_000_000 + now.month() * 10_000 + now.day() * 100 + now.hour()
}

/// Resolve a host name relative to `origin`.
///
/// `@` is the apex, names already equal to or under the origin are kept, and
/// anything else is treated as relative and gets the origin appended.
pub fn qualify_host(origin: &str, host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    let origin = origin.trim_end_matches('.').to_lowercase();

    if host == "@" || host.is_empty() || host == origin {
        origin
    } else if host.ends_with(&format!(".{}", origin)) {
        host
    } else {
        format!("{}.{}", host, origin)
    }
}

fn expect_literal(token: &str, expected: &str) -> Result<(), String> {
    if token.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(format!("expected {}, found {}", expected, token))
    }
}

/// Names are stored absolute: exactly one trailing dot, non-empty before it
fn absolute_name(token: &str) -> Result<String, String> {
    match token.strip_suffix('.') {
        Some(name) if !name.is_empty() && !name.ends_with('.') => Ok(name.to_string()),
        _ => Err(format!("Name is not absolute: {}", token)),
    }
}

fn parse_u32(field: &str, token: &str) -> Result<u32, String> {
    token
        .parse()
        .map_err(|_| format!("Invalid {} value: {}", field, token))
}
