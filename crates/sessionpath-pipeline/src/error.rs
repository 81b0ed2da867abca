//! Job and partition error types

use sessionpath_ingress::IngressError;
use sessionpath_storage::StorageError;
use thiserror::Error;

/// Failure of a single partition attempt; retried by the job runner
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] sessionpath_core::Error),

    #[error("Attempt panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Failure of a whole job run; no partial result is returned
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Ingress(#[from] IngressError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Partition {partition} failed after {attempts} attempts: {last_error}")]
    PartitionFailed {
        partition: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type JobResult<T> = Result<T, JobError>;
