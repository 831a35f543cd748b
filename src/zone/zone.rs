use super::{AddressRecord, Result, SoaRecord, ZoneError};
use serde::Serialize;

/// A zone as persisted: the SOA line followed by address records in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub soa: SoaRecord,
    pub records: Vec<AddressRecord>,
}

impl Zone {
    /// Create a new zone with no records
    pub fn new(soa: SoaRecord) -> Self {
        Self {
            soa,
            records: Vec::new(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.soa.name
    }

    pub fn serial(&self) -> u32 {
        self.soa.serial
    }

    /// Parse zone file contents stored under `origin`.
    ///
    /// The first non-blank line must be the SOA for `origin`; every further
    /// non-blank line must be an address record. Line numbers in errors are
    /// 1-based positions in `contents`.
    pub fn parse(origin: &str, contents: &str) -> Result<Self> {
        let mut lines = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (index, first) = lines
            .next()
            .ok_or_else(|| corrupt(origin, 1, "zone file has no SOA record".to_string()))?;

        let soa = SoaRecord::parse(first).map_err(|reason| corrupt(origin, index + 1, reason))?;
        if soa.name != origin {
            return Err(corrupt(
                origin,
                index + 1,
                format!("SOA names zone {}", soa.name),
            ));
        }

        let records = lines
            .map(|(index, line)| {
                AddressRecord::parse(line).map_err(|reason| corrupt(origin, index + 1, reason))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { soa, records })
    }

    /// Zone file contents: one newline-terminated line per record, SOA first
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.soa);
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }

    /// Records whose host name is exactly `host`
    pub fn records_named<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a AddressRecord> {
        self.records.iter().filter(move |r| r.name == host)
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.records_named(host).next().is_some()
    }
}

fn corrupt(zone: &str, line: usize, reason: String) -> ZoneError {
    ZoneError::Corrupt {
        zone: zone.to_string(),
        line,
        reason,
    }
}
