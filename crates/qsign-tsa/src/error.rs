//! Error types for qsign-tsa

use thiserror::Error;

/// Errors that can occur in TSA operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure or non-success HTTP status
    #[error("TSA request failed: {0}")]
    Transport(#[from] qsign_transport::Error),

    /// ASN.1 encoding/decoding error
    #[error("ASN.1 error: {0}")]
    Asn1(String),

    /// Undecodable response or a status other than granted
    #[error("Invalid timestamp response: {0}")]
    InvalidResponse(String),

    /// Malformed token structure
    #[error("Failed to parse timestamp token: {0}")]
    ParseError(String),

    /// No TSTInfo in timestamp token
    #[error("No TSTInfo in timestamp token")]
    NoTstInfo,

    /// Token nonce differs from the request nonce
    #[error("Timestamp nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch { expected: String, actual: String },

    /// Token covers different bytes than the payload
    #[error("Timestamp message imprint mismatch: expected {expected}, got {actual}")]
    ImprintMismatch { expected: String, actual: String },

    /// Signed-attribute message-digest does not cover the TSTInfo
    #[error("Signed attribute message-digest mismatch: expected {expected}, got {actual}")]
    MessageDigestMismatch { expected: String, actual: String },

    /// Failed to verify timestamp signature
    #[error("Failed to verify timestamp signature: {0}")]
    SignatureVerificationError(String),

    /// TSA certificate does not chain to a trusted anchor
    #[error("TSA certificate validation failed: {0}")]
    CertificateValidationError(String),

    /// Trust anchors could not be loaded
    #[error("Trust list error: {0}")]
    TrustList(#[from] qsign_trust_list::Error),

    /// Invalid client configuration
    #[error("Invalid TSA configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether the failure happened while obtaining a response, so another
    /// authority may be asked
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::InvalidResponse(_))
    }
}

/// Result type for TSA operations
pub type Result<T> = std::result::Result<T, Error>;
