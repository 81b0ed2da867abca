//! Ingress error types

use thiserror::Error;

/// Why a single raw line was rejected
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("expected 3 delimited parts, found {found}")]
    MissingParts { found: usize },

    #[error("invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid business JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("business payload is not a JSON object")]
    NotAnObject,

    #[error("invalid key field: {0}")]
    InvalidKeyField(#[from] sessionpath_core::Error),
}

impl ParseError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::InvalidUtf8(_) => "invalid_utf8",
            ParseError::MissingParts { .. } => "missing_parts",
            ParseError::InvalidTimestamp { .. } => "invalid_timestamp",
            ParseError::InvalidJson(_) => "invalid_json",
            ParseError::NotAnObject => "not_an_object",
            ParseError::InvalidKeyField(_) => "invalid_key_field",
        }
    }
}

/// Errors raised while locating or reading input
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type IngressResult<T> = Result<T, IngressError>;
