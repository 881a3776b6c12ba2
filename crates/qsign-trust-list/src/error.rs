//! Error types for trust list operations

use thiserror::Error;

/// Errors that can occur while loading trust lists or validating chains
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure fetching a list
    #[error("failed to fetch trust list: {0}")]
    Transport(#[from] qsign_transport::Error),

    /// Malformed trust list XML
    #[error("failed to parse trust list XML: {0}")]
    Xml(String),

    /// Certificate parsing error
    #[error("failed to parse certificate: {0}")]
    Certificate(String),

    /// Invalid pointer or endpoint URL
    #[error("invalid trust list URL: {0}")]
    Url(String),

    /// Cache read/write failure
    #[error("trust list cache error: {0}")]
    Cache(#[from] qsign_cache::Error),

    /// Snapshot (de)serialization failure
    #[error("failed to encode trust list snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// No path from a certificate to any known anchor, or no anchors at all
    #[error("trust chain error: {0}")]
    TrustChain(String),
}

/// Result type for trust list operations
pub type Result<T> = std::result::Result<T, Error>;
