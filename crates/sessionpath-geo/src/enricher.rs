//! Per-event geolocation enrichment

use sessionpath_core::Address;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of resolving one IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Address),
    /// Well-formed IP with no entry in the dataset
    Miss,
    /// The value is not an IP address
    InvalidIp,
    /// The record carries no IP at all
    Absent,
}

impl LookupOutcome {
    /// Label for unresolved outcomes, `None` when found
    pub fn miss_reason(&self) -> Option<&'static str> {
        match self {
            LookupOutcome::Found(_) => None,
            LookupOutcome::Miss => Some("not_found"),
            LookupOutcome::InvalidIp => Some("invalid_ip"),
            LookupOutcome::Absent => Some("absent_ip"),
        }
    }

    /// Collapse to an address, substituting the unknown sentinel
    pub fn into_address(self) -> Address {
        match self {
            LookupOutcome::Found(address) => address,
            _ => Address::unknown(),
        }
    }
}

/// Read-only IP dataset shared by every aggregator on a worker
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> LookupOutcome;
}

/// Exact-match lookup, handy for small fixed datasets
impl GeoLookup for HashMap<String, Address> {
    fn lookup(&self, ip: &str) -> LookupOutcome {
        match self.get(ip) {
            Some(address) => LookupOutcome::Found(address.clone()),
            None if ip.parse::<std::net::IpAddr>().is_ok() => LookupOutcome::Miss,
            None => LookupOutcome::InvalidIp,
        }
    }
}

/// Wraps a dataset with the enrichment contract: lookups never fail a record
#[derive(Clone)]
pub struct GeoEnricher {
    lookup: Arc<dyn GeoLookup>,
}

impl GeoEnricher {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve an optional IP, keeping the reason for a miss
    pub fn resolve(&self, ip: Option<&str>) -> LookupOutcome {
        match ip.map(str::trim) {
            None | Some("") => LookupOutcome::Absent,
            Some(ip) => self.lookup.lookup(ip),
        }
    }

    /// Resolve an optional IP to an address or the unknown sentinel
    pub fn enrich(&self, ip: Option<&str>) -> Address {
        self.resolve(ip).into_address()
    }
}

impl std::fmt::Debug for GeoEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoEnricher").finish_non_exhaustive()
    }
}
