//! SessionPath Ingress
//!
//! Turns raw delimited log lines into typed records and attaches the
//! composite sort key used by the shuffle:
//! - Line decoding (timestamp, action name, business JSON)
//! - Key extraction (`session_id`, `time_tag`)
//! - Input discovery and line reading

pub mod error;
pub mod parser;
pub mod source;

pub use error::{IngressError, IngressResult, ParseError};
pub use parser::{DEFAULT_DELIMITER, LineParser, ParserConfig, TIMESTAMP_FORMAT, keyed};
pub use source::{InputSource, decode_line, scan_inputs};
