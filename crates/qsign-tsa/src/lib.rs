//! RFC 3161 Time-Stamp Protocol client for qsign
//!
//! This crate implements the Time-Stamp Protocol as specified in RFC 3161:
//! request creation, acquisition with a backup authority, and full token
//! verification against the EU trust anchors.

pub mod asn1;
pub mod client;
pub mod error;
pub mod verify;

pub use asn1::{
    AlgorithmIdentifier, Asn1MessageImprint, PkiStatus, PkiStatusInfo, TimeStampReq,
    TimeStampResp, TstInfo,
};
pub use client::{TimestampClient, TimestampConfig, TIMESTAMP_QUERY_CONTENT_TYPE};
pub use error::{Error, Result};
pub use verify::{verify_timestamp_response, TimestampToken, VerifyOpts};
