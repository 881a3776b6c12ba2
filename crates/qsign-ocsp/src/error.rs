//! Error types for qsign-ocsp

use thiserror::Error;

/// Errors that can occur while checking revocation status
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure or non-success HTTP status
    #[error("OCSP request failed: {0}")]
    Transport(#[from] qsign_transport::Error),

    /// ASN.1 encoding/decoding error
    #[error("ASN.1 error: {0}")]
    Asn1(String),

    /// Certificate parsing error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The certificate names no OCSP responder
    #[error("certificate has no OCSP responder URL")]
    NoResponderUrl,

    /// Responder URL rejected by configuration
    #[error("refusing OCSP responder URL {0}")]
    InsecureUrl(String),

    /// Response status other than successful
    #[error("OCSP responder answered {0}")]
    UnsuccessfulStatus(String),

    /// Response type other than id-pkix-ocsp-basic
    #[error("unsupported OCSP response type {0}")]
    UnsupportedResponseType(String),

    /// Response carries no nonce extension
    #[error("OCSP response does not echo the request nonce")]
    MissingNonce,

    /// Response nonce differs from the request nonce
    #[error("OCSP nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch { expected: String, actual: String },

    /// No single response for the requested certificate
    #[error("OCSP response does not cover the requested certificate")]
    CertIdMismatch,

    /// Response signature does not verify
    #[error("OCSP response signature invalid: {0}")]
    Signature(String),

    /// Responder certificate is not authorized
    #[error("OCSP responder not trusted: {0}")]
    TrustChain(String),

    /// thisUpdate in the future or nextUpdate passed
    #[error("OCSP response outside its validity window: {0}")]
    Stale(String),

    /// Trust anchors could not be loaded
    #[error("trust list error: {0}")]
    TrustList(#[from] qsign_trust_list::Error),
}

/// Result type for OCSP operations
pub type Result<T> = std::result::Result<T, Error>;
