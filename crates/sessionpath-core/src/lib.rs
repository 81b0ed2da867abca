//! SessionPath Core Types
//!
//! This crate provides the fundamental types used throughout SessionPath:
//! - Record model (`FieldValue` tagged union and the `Record` field map)
//! - Composite sort key, partition function and group equality
//! - Enriched output record
//! - Core error types

pub mod enriched;
pub mod error;
pub mod key;
pub mod record;

pub use enriched::{Address, EnrichedRecord};
pub use error::{Error, Result};
pub use key::{CompositeKey, partition_for, same_group};
pub use record::{FieldValue, Record};
