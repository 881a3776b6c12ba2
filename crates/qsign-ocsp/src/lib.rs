//! OCSP revocation checking for qsign
//!
//! Revocation evidence only upgrades a signature package to long-term
//! validation; it is never required to sign. [`RevocationChecker::check`]
//! therefore returns `Option`, while [`RevocationChecker::try_check`] reports
//! why no evidence was produced.

pub mod asn1;
pub mod checker;
pub mod error;

pub use asn1::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    ResponderId, SingleResponse,
};
pub use checker::{
    build_request, verify_response, verify_stored_response, OcspConfig, PreparedRequest,
    RevocationChecker, RevocationEvidence, RevocationStatus, OCSP_REQUEST_CONTENT_TYPE,
};
pub use error::{Error, Result};
