//! Error types for qsign-types

use thiserror::Error;

/// Errors that can occur in qsign-types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid hex/base64 encoding or wrong length
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Invalid hash algorithm
    #[error("Invalid hash algorithm: {0}")]
    InvalidHashAlgorithm(String),

    /// Invalid signature format tag
    #[error("Invalid signature format: {0}")]
    InvalidFormat(String),
}

/// Result type for qsign-types operations
pub type Result<T> = std::result::Result<T, Error>;
