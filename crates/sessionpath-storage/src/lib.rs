//! SessionPath Storage
//!
//! Partition output with all-or-nothing commit:
//! - Atomic file writer (temp file + rename)
//! - `OutputSink` / `PartitionWriter` seam used by the job runner
//! - JSON lines directory output and an in-memory output
//! - Output directory preparation and the `_SUCCESS` marker

pub mod atomic_writer;
pub mod error;
pub mod jsonl_output;
pub mod memory_output;
pub mod output_dir;
pub mod sink;

pub use atomic_writer::AtomicWriter;
pub use error::{StorageError, StorageResult};
pub use jsonl_output::JsonlOutput;
pub use memory_output::MemoryOutput;
pub use output_dir::{SUCCESS_MARKER, partition_file_name, prepare_output_dir, write_success_marker};
pub use sink::{OutputSink, PartitionWriter};
