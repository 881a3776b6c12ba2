//! Error types for qsign-transport

use thiserror::Error;

/// Errors that can occur while talking to a remote endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// Connection, TLS or protocol level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The per-call timeout elapsed
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// The endpoint answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;
