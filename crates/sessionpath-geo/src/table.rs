//! IPv4 range table loaded from a JSON lines snapshot
//!
//! Each non-blank, non-comment line is one range:
//!
//! ```text
//! {"start": "1.1.1.0", "end": "1.1.1.255", "country": "US", "province": "CA", "city": "LA"}
//! ```
//!
//! `end` defaults to `start` for single addresses.

use crate::enricher::{GeoLookup, LookupOutcome};
use crate::error::{GeoError, GeoResult};
use serde::{Deserialize, Serialize};
use sessionpath_core::Address;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// One snapshot entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoRange {
    pub start: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Ipv4Addr>,
    pub country: String,
    pub province: String,
    pub city: String,
}

/// Immutable range table; safe to share between partitions
#[derive(Debug, Default)]
pub struct GeoTable {
    /// start -> (end, address)
    ranges: BTreeMap<u32, (u32, Address)>,
}

impl GeoTable {
    /// Build from ranges, rejecting inverted or overlapping entries
    ///
    /// Errors name entries by their 1-based position.
    pub fn from_ranges(ranges: impl IntoIterator<Item = GeoRange>) -> GeoResult<Self> {
        Self::build(
            ranges
                .into_iter()
                .enumerate()
                .map(|(index, range)| (index + 1, range)),
        )
    }

    /// Parse a JSON lines snapshot; errors carry the file line number
    pub fn from_reader<R: BufRead>(reader: R) -> GeoResult<Self> {
        let mut ranges = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let range: GeoRange =
                serde_json::from_str(trimmed).map_err(|e| GeoError::InvalidEntry {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            ranges.push((index + 1, range));
        }

        Self::build(ranges)
    }

    fn build(ranges: impl IntoIterator<Item = (usize, GeoRange)>) -> GeoResult<Self> {
        let mut table: BTreeMap<u32, (u32, Address)> = BTreeMap::new();

        for (line, range) in ranges {
            let start = u32::from(range.start);
            let end = u32::from(range.end.unwrap_or(range.start));
            if start > end {
                return Err(GeoError::InvalidEntry {
                    line,
                    reason: format!("start {} is after end {}", range.start, Ipv4Addr::from(end)),
                });
            }
            if let Some((existing_end, _)) = table.get(&start) {
                return Err(GeoError::Overlap {
                    first: format_range(start, *existing_end),
                    second: format_range(start, end),
                });
            }
            let address = Address::new(range.country, range.province, range.city);
            table.insert(start, (end, address));
        }

        let mut previous: Option<(u32, u32)> = None;
        for (&start, &(end, _)) in &table {
            if let Some((prev_start, prev_end)) = previous
                && start <= prev_end
            {
                return Err(GeoError::Overlap {
                    first: format_range(prev_start, prev_end),
                    second: format_range(start, end),
                });
            }
            previous = Some((start, end));
        }

        Ok(Self { ranges: table })
    }

    /// Load a snapshot file; done once per worker before processing
    pub fn load<P: AsRef<Path>>(path: P) -> GeoResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            ranges = table.len(),
            "Loaded geolocation dataset"
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn find(&self, ip: Ipv4Addr) -> Option<&Address> {
        let ip = u32::from(ip);
        self.ranges
            .range(..=ip)
            .next_back()
            .filter(|(_, (end, _))| ip <= *end)
            .map(|(_, (_, address))| address)
    }
}

fn format_range(start: u32, end: u32) -> String {
    format!("{}-{}", Ipv4Addr::from(start), Ipv4Addr::from(end))
}

impl GeoLookup for GeoTable {
    fn lookup(&self, ip: &str) -> LookupOutcome {
        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => match self.find(v4) {
                Some(address) => LookupOutcome::Found(address.clone()),
                None => LookupOutcome::Miss,
            },
            // The dataset is IPv4 only
            Ok(IpAddr::V6(_)) => LookupOutcome::Miss,
            Err(_) => LookupOutcome::InvalidIp,
        }
    }
}
