//! Partitioning and sorting between the map and reduce stages
//!
//! Map tasks bucket keyed records by `partition_for` (group key only);
//! after every map task has finished, buckets are merged per partition and
//! sorted by the composite key. Every record of a session therefore lands
//! in one partition, contiguous and in `time_tag` order.

use sessionpath_core::{CompositeKey, Record, partition_for};

/// Keyed records bucketed by destination partition, produced by one map task
#[derive(Debug, Clone)]
pub struct MapOutput {
    buckets: Vec<Vec<(CompositeKey, Record)>>,
}

impl MapOutput {
    pub fn new(num_partitions: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); num_partitions],
        }
    }

    /// Route one keyed record to its partition bucket
    pub fn push(&mut self, key: CompositeKey, record: Record) -> sessionpath_core::Result<()> {
        let partition = partition_for(&key, self.buckets.len())?;
        self.buckets[partition].push((key, record));
        Ok(())
    }

    pub fn num_partitions(&self) -> usize {
        self.buckets.len()
    }

    /// Total records across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorted reduce input for one partition
#[derive(Debug, Clone)]
pub struct Partition {
    pub index: usize,
    entries: Vec<(CompositeKey, Record)>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in composite key order
    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey, &Record)> {
        self.entries.iter().map(|(key, record)| (key, record))
    }
}

/// Merge map outputs and sort every partition
///
/// Outputs are merged in the order given and sorted stably, so records
/// with identical keys keep their input order and replays are identical.
pub fn shuffle(outputs: Vec<MapOutput>, num_partitions: usize) -> Vec<Partition> {
    let mut merged: Vec<Vec<(CompositeKey, Record)>> = vec![Vec::new(); num_partitions];

    for output in outputs {
        for (index, bucket) in output.buckets.into_iter().enumerate() {
            if let Some(target) = merged.get_mut(index) {
                target.extend(bucket);
            }
        }
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(index, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Partition { index, entries }
        })
        .collect()
}
