//! JSON lines directory output, one file per partition

use crate::atomic_writer::AtomicWriter;
use crate::error::StorageResult;
use crate::output_dir::{partition_file_name, write_success_marker};
use crate::sink::{OutputSink, PartitionWriter};
use std::path::{Path, PathBuf};

/// Writes `part-r-NNNNN.jsonl` files into an output directory
#[derive(Debug, Clone)]
pub struct JsonlOutput {
    output_dir: PathBuf,
}

impl JsonlOutput {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of a partition's committed file
    pub fn partition_path(&self, partition: usize) -> PathBuf {
        self.output_dir.join(partition_file_name(partition))
    }
}

impl OutputSink for JsonlOutput {
    fn open_partition(
        &self,
        partition: usize,
        attempt: u32,
    ) -> StorageResult<Box<dyn PartitionWriter>> {
        let path = self.partition_path(partition);
        tracing::debug!(partition, attempt, path = %path.display(), "Opening partition output");
        Ok(Box::new(JsonlPartitionWriter {
            writer: AtomicWriter::new(path)?,
            lines: 0,
        }))
    }

    fn finalize(&self) -> StorageResult<()> {
        let marker = write_success_marker(&self.output_dir)?;
        tracing::info!(path = %marker.display(), "Output complete");
        Ok(())
    }
}

struct JsonlPartitionWriter {
    writer: AtomicWriter,
    lines: u64,
}

impl PartitionWriter for JsonlPartitionWriter {
    fn write_line(&mut self, line: &str) -> StorageResult<()> {
        self.writer.write(line.as_bytes())?;
        self.writer.write(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<u64> {
        let lines = self.lines;
        self.writer.commit()?;
        Ok(lines)
    }
}
