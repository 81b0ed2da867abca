//! Raw log line decoding
//!
//! A line is `timestamp DELIM active_name DELIM {business json}`. The
//! timestamp becomes `time_tag` (epoch millis), the action name becomes
//! `active_name`, and every business field is merged on top.

use crate::error::{IngressError, IngressResult, ParseError};
use chrono::{FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sessionpath_core::record::fields;
use sessionpath_core::{CompositeKey, Record};

/// Field separator used by the log producers
pub const DEFAULT_DELIMITER: char = '\u{1111}';

/// `yyyy-MM-dd HH:mm:ss.SSS`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Separator between timestamp, action name and payload
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Offset of the producers' wall clock from UTC, in seconds
    #[serde(default)]
    pub utc_offset_seconds: i32,

    /// When set, records are projected to these fields (key fields are
    /// always kept)
    #[serde(default)]
    pub retained_fields: Option<Vec<String>>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            utc_offset_seconds: 0,
            retained_fields: None,
        }
    }
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}

/// Stateless line decoder, cheap to clone into map tasks
#[derive(Debug, Clone)]
pub struct LineParser {
    delimiter: char,
    offset: FixedOffset,
    retained_fields: Option<Vec<String>>,
}

impl LineParser {
    pub fn new(config: ParserConfig) -> IngressResult<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_seconds).ok_or_else(|| {
            IngressError::Config(format!(
                "utc_offset_seconds out of range: {}",
                config.utc_offset_seconds
            ))
        })?;

        Ok(Self {
            delimiter: config.delimiter,
            offset,
            retained_fields: config.retained_fields,
        })
    }

    /// Decode one non-blank line into a record
    pub fn parse(&self, line: &str) -> Result<Record, ParseError> {
        // Adjacent delimiters collapse; anything after the payload is ignored
        let mut parts = line.split(self.delimiter).filter(|p| !p.is_empty());
        let (Some(timestamp), Some(active_name), Some(payload)) =
            (parts.next(), parts.next(), parts.next())
        else {
            let found = line.split(self.delimiter).filter(|p| !p.is_empty()).count();
            return Err(ParseError::MissingParts { found });
        };

        let time_tag = self.parse_timestamp(timestamp)?;

        let serde_json::Value::Object(business) = serde_json::from_str(payload)? else {
            return Err(ParseError::NotAnObject);
        };

        let mut record = Record::new();
        record.insert(fields::TIME_TAG, time_tag);
        record.insert(fields::ACTIVE_NAME, active_name);
        record.merge_json_object(business);

        if let Some(retained) = &self.retained_fields {
            record.project(retained);
        }

        Ok(record)
    }

    /// Decode a line and attach its composite key
    pub fn parse_keyed(&self, line: &str) -> Result<(CompositeKey, Record), ParseError> {
        keyed(self.parse(line)?)
    }

    fn parse_timestamp(&self, value: &str) -> Result<i64, ParseError> {
        let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(
            |source| ParseError::InvalidTimestamp {
                value: value.to_string(),
                source,
            },
        )?;

        let offset_millis = i64::from(self.offset.local_minus_utc()) * 1000;
        Ok(naive.and_utc().timestamp_millis() - offset_millis)
    }
}

/// Extract `(session_id, time_tag)` as the composite key
///
/// Records without a string `session_id` or an integer `time_tag` are
/// rejected here so they never reach the aggregator.
pub fn keyed(record: Record) -> Result<(CompositeKey, Record), ParseError> {
    let session_id = record.get_str(fields::SESSION_ID)?.to_string();
    let time_tag = record.get_i64(fields::TIME_TAG)?;
    Ok((CompositeKey::new(session_id, time_tag), record))
}
