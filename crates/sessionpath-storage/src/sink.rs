//! Output seam between the aggregator and persistence

use crate::error::StorageResult;

/// Destination for partition output
///
/// Every attempt at a partition gets a fresh writer. A writer that is
/// dropped without [`PartitionWriter::commit`] must leave no trace, and a
/// committed writer replaces whatever an earlier attempt published, so a
/// retried partition never yields duplicate or mixed lines.
pub trait OutputSink: Send + Sync {
    /// Open a writer for one attempt of one partition
    fn open_partition(
        &self,
        partition: usize,
        attempt: u32,
    ) -> StorageResult<Box<dyn PartitionWriter>>;

    /// Called once after every partition has committed
    fn finalize(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Writer for a single partition attempt
pub trait PartitionWriter: Send {
    /// Append one output line (without trailing newline)
    fn write_line(&mut self, line: &str) -> StorageResult<()>;

    /// Publish all lines written so far; returns the number of lines
    fn commit(self: Box<Self>) -> StorageResult<u64>;
}
