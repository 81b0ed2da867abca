//! Per-partition session aggregation
//!
//! The aggregator consumes one partition's records in composite key order
//! and keeps an explicit two-state machine:
//!
//! - `NoActiveGroup`: nothing seen yet in this partition
//! - `InGroup`: the current session key and its action path so far
//!
//! A record with the current session key extends the path; any other key
//! starts a fresh path. After every append the record is enriched with its
//! geolocation and a snapshot of the path is emitted, so the N-th record of
//! a session carries exactly N path units.

use sessionpath_core::record::fields;
use sessionpath_core::{CompositeKey, EnrichedRecord, Record, same_group};
use sessionpath_geo::{GeoEnricher, LookupOutcome};
use std::collections::BTreeMap;

/// `active_name` value whose path unit is the request URL
pub const PAGEVIEW: &str = "pageview";

/// Aggregation state of one partition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupState {
    #[default]
    NoActiveGroup,
    InGroup {
        group_key: CompositeKey,
        action_path: Vec<String>,
    },
}

/// What a record did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First record of a session; path reset to one unit
    Started,
    /// Same session as the previous record; path extended
    Continued,
}

impl GroupState {
    /// Apply one record's key and path unit
    pub fn advance(&mut self, key: &CompositeKey, unit: String) -> Transition {
        match self {
            GroupState::InGroup {
                group_key,
                action_path,
            } if same_group(group_key, key) => {
                action_path.push(unit);
                Transition::Continued
            }
            _ => {
                *self = GroupState::InGroup {
                    group_key: key.clone(),
                    action_path: vec![unit],
                };
                Transition::Started
            }
        }
    }

    /// Session id of the active group
    pub fn group_key(&self) -> Option<&str> {
        match self {
            GroupState::NoActiveGroup => None,
            GroupState::InGroup { group_key, .. } => Some(&group_key.group_key),
        }
    }

    /// Path accumulated for the active group (empty before the first record)
    pub fn action_path(&self) -> &[String] {
        match self {
            GroupState::NoActiveGroup => &[],
            GroupState::InGroup { action_path, .. } => action_path,
        }
    }
}

/// The unit a record contributes to its session's path
///
/// `req_url` for page views, the action name otherwise. Missing or
/// non-string values contribute an empty unit instead of failing the
/// partition.
pub fn path_unit(record: &Record) -> String {
    let active_name = string_field(record, fields::ACTIVE_NAME);
    let unit = if active_name == Some(PAGEVIEW) {
        string_field(record, fields::REQ_URL)
    } else {
        active_name
    };
    unit.unwrap_or_default().to_string()
}

fn string_field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    match record.opt_str(name) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(field = name, error = %e, "Ignoring non-string path field");
            None
        }
    }
}

/// Counters for one partition attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub records: u64,
    pub sessions: u64,
    /// Unresolved lookups by reason label
    pub lookup_misses: BTreeMap<&'static str, u64>,
}

impl AggregatorStats {
    pub fn total_misses(&self) -> u64 {
        self.lookup_misses.values().sum()
    }
}

/// Stateful reducer for a single partition
///
/// One instance per partition attempt; state never crosses partitions.
#[derive(Debug)]
pub struct SessionAggregator {
    enricher: GeoEnricher,
    state: GroupState,
    stats: AggregatorStats,
}

impl SessionAggregator {
    pub fn new(enricher: GeoEnricher) -> Self {
        Self {
            enricher,
            state: GroupState::NoActiveGroup,
            stats: AggregatorStats::default(),
        }
    }

    /// Consume one record and produce its enriched output
    ///
    /// Records must arrive in composite key order.
    pub fn process(&mut self, key: &CompositeKey, record: &Record) -> EnrichedRecord {
        let unit = path_unit(record);
        if self.state.advance(key, unit) == Transition::Started {
            self.stats.sessions += 1;
        }

        let outcome = match record.opt_str(fields::IP) {
            Ok(ip) => self.enricher.resolve(ip),
            Err(_) => LookupOutcome::InvalidIp,
        };
        if let Some(reason) = outcome.miss_reason() {
            tracing::debug!(session = %key.group_key, reason, "Geolocation unresolved");
            *self.stats.lookup_misses.entry(reason).or_insert(0) += 1;
        }

        self.stats.records += 1;
        EnrichedRecord::new(
            record.clone(),
            outcome.into_address(),
            self.state.action_path().to_vec(),
        )
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    pub fn into_stats(self) -> AggregatorStats {
        self.stats
    }
}
