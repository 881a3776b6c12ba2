//! Cryptographic primitives for qsign
//!
//! This crate provides key loading, signing, algorithm-dispatched signature
//! verification and X.509 inspection using aws-lc-rs as the backend.

pub mod error;
pub mod hash;
pub mod oids;
pub mod signing;
pub mod verification;
pub mod x509;

pub use error::{Error, Result};
pub use hash::{digest, sha1, sha256, sha384, sha512};
pub use signing::{KeyPair, Signature, SigningScheme};
pub use verification::{resolve_scheme, verify_signature, VerificationKey};
pub use x509::{
    certificate_fingerprint, extract_ocsp_url, is_qualified, load_certificate, parse_certificate,
    parse_certificate_info, subject_public_key_bytes, CertificateInfo,
};
