//! Geolocation dataset errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid entry at line {line}: {reason}")]
    InvalidEntry { line: usize, reason: String },

    #[error("Overlapping ranges: {first} and {second}")]
    Overlap { first: String, second: String },
}

pub type GeoResult<T> = Result<T, GeoError>;
