//! Enriched output record

use crate::record::{FieldValue, Record, fields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder used for every component of an unresolved address
pub const UNKNOWN: &str = "unknown";

/// Geolocation triple attached to each output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: String,
    pub province: String,
    pub city: String,
}

impl Address {
    pub fn new(
        country: impl Into<String>,
        province: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            province: province.into(),
            city: city.into(),
        }
    }

    /// Sentinel returned when the IP could not be resolved
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

/// Original fields plus `address` and the session's `action_path` snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
    pub address: Address,
    pub action_path: Vec<String>,
}

impl EnrichedRecord {
    /// Build an output record; business fields named `address` or
    /// `action_path` are replaced by the enrichment
    pub fn new(record: Record, address: Address, action_path: Vec<String>) -> Self {
        let mut fields = record.into_fields();
        fields.remove(fields::ADDRESS);
        fields.remove(fields::ACTION_PATH);

        Self {
            fields,
            address,
            action_path,
        }
    }

    /// Serialize as one JSON line (no trailing newline)
    pub fn to_json_line(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sentinel() {
        let unknown = Address::unknown();
        assert_eq!(unknown.country, "unknown");
        assert_eq!(unknown.province, "unknown");
        assert_eq!(unknown.city, "unknown");
        assert!(unknown.is_unknown());
        assert!(!Address::new("US", "CA", "LA").is_unknown());
    }

    #[test]
    fn test_json_line_contains_fields_and_enrichment() {
        let mut record = Record::new();
        record.insert(fields::SESSION_ID, "s1");
        record.insert(fields::TIME_TAG, 100_i64);

        let enriched = EnrichedRecord::new(
            record,
            Address::new("US", "CA", "LA"),
            vec!["/a".to_string()],
        );

        let line = enriched.to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"session_id":"s1","time_tag":100,"address":{"country":"US","province":"CA","city":"LA"},"action_path":["/a"]}"#
        );
    }

    #[test]
    fn test_colliding_business_fields_are_replaced() {
        let mut record = Record::new();
        record.insert(fields::SESSION_ID, "s1");
        record.insert(fields::ADDRESS, "somewhere");
        record.insert(fields::ACTION_PATH, "stale");

        let enriched = EnrichedRecord::new(record, Address::unknown(), vec!["click".into()]);
        let value: serde_json::Value =
            serde_json::from_str(&enriched.to_json_line().unwrap()).unwrap();

        assert_eq!(value["address"]["city"], "unknown");
        assert_eq!(value["action_path"], serde_json::json!(["click"]));
    }
}
