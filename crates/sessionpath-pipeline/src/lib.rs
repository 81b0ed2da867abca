//! SessionPath Pipeline
//!
//! The batch job that rebuilds per-session action paths:
//! - Map: parse raw lines, attach composite keys, bucket by partition
//! - Shuffle: barrier, then sort each partition by the composite key
//! - Reduce: one `SessionAggregator` per partition, enriched output with
//!   atomic commit and bounded retries

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod job;
pub mod partition;
pub mod shuffle;

pub use aggregator::{AggregatorStats, GroupState, SessionAggregator, Transition, path_unit};
pub use cancel::CancelToken;
pub use config::JobConfig;
pub use error::{JobError, JobResult, PartitionError};
pub use job::{JobReport, JobRunner};
pub use partition::run_attempt;
pub use shuffle::{MapOutput, Partition, shuffle};
