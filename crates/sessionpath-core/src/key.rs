//! Composite sort key, partition function and group equality
//!
//! The shuffle sorts by the whole key but partitions and groups by the
//! session id alone. Partitioning must never look at `order_key`, otherwise
//! one session's events could land on two workers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// `(session_id, time_tag)` key attached to every record before the shuffle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    /// Grouping component (session id)
    pub group_key: String,
    /// Ordering component (event time, epoch millis)
    pub order_key: i64,
}

impl CompositeKey {
    pub fn new(group_key: impl Into<String>, order_key: i64) -> Self {
        Self {
            group_key: group_key.into(),
            order_key,
        }
    }
}

/// Group key first (lexicographic), then order key (numeric ascending)
impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group_key
            .cmp(&other.group_key)
            .then_with(|| self.order_key.cmp(&other.order_key))
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Assign a key to a partition in `[0, num_partitions)`
///
/// Uses the first eight bytes of SHA-256 over the group key, so the
/// assignment is identical across processes, platforms and releases.
pub fn partition_for(key: &CompositeKey, num_partitions: usize) -> Result<usize> {
    if num_partitions == 0 {
        return Err(Error::InvalidPartitionCount(num_partitions));
    }

    let digest = Sha256::digest(key.group_key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);

    Ok((hash % num_partitions as u64) as usize)
}

/// True when both keys belong to the same session; `order_key` is ignored
pub fn same_group(a: &CompositeKey, b: &CompositeKey) -> bool {
    a.group_key == b.group_key
}
