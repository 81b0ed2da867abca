//! In-memory output, used for dry runs and tests

use crate::error::{StorageError, StorageResult};
use crate::sink::{OutputSink, PartitionWriter};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Committed = Arc<Mutex<BTreeMap<usize, Vec<String>>>>;

/// Keeps committed partition output in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    committed: Committed,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed lines of one partition
    pub fn partition(&self, partition: usize) -> Option<Vec<String>> {
        self.committed
            .lock()
            .ok()
            .and_then(|c| c.get(&partition).cloned())
    }

    /// All committed lines, partition by partition
    pub fn lines(&self) -> Vec<String> {
        self.committed
            .lock()
            .map(|c| c.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of partitions with committed output
    pub fn committed_partitions(&self) -> usize {
        self.committed.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl OutputSink for MemoryOutput {
    fn open_partition(
        &self,
        partition: usize,
        _attempt: u32,
    ) -> StorageResult<Box<dyn PartitionWriter>> {
        Ok(Box::new(MemoryPartitionWriter {
            partition,
            lines: Vec::new(),
            committed: Arc::clone(&self.committed),
        }))
    }
}

struct MemoryPartitionWriter {
    partition: usize,
    lines: Vec<String>,
    committed: Committed,
}

impl PartitionWriter for MemoryPartitionWriter {
    fn write_line(&mut self, line: &str) -> StorageResult<()> {
        self.lines.push(line.to_string());
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<u64> {
        let Self {
            partition,
            lines,
            committed,
        } = *self;
        let count = lines.len() as u64;
        let mut committed = committed
            .lock()
            .map_err(|e| StorageError::Write(format!("output lock poisoned: {}", e)))?;
        committed.insert(partition, lines);
        Ok(count)
    }
}
