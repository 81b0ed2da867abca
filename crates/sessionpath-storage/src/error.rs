//! Storage error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output directory is not empty: {0}")]
    OutputExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Write failed: {0}")]
    Write(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
