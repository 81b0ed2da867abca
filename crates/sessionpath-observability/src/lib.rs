//! SessionPath Observability
//!
//! Prometheus metrics for batch job runs.

pub mod metrics;

pub use metrics::{AttemptOutcome, JobMetrics};
