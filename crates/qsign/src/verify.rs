//! Re-verification of stored packages
//!
//! A package is self-contained: together with the original content and
//! metadata it is enough to rebuild the signed payload and check every piece
//! of evidence again.

use crate::error::{Error, Result};
use crate::payload::SignaturePayload;
use chrono::{DateTime, Duration, Utc};
use qsign_crypto::{certificate_fingerprint, parse_certificate, SigningScheme, VerificationKey};
use qsign_ocsp::{verify_stored_response, RevocationStatus};
use qsign_trust_list::{KeyPurpose, TrustAnchorSet, TrustListStore};
use qsign_tsa::{verify_timestamp_response, TimestampToken, VerifyOpts};
use qsign_types::{Sha256Hash, SignatureFormat, SignaturePackage};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// How far, in seconds, the signing time may lie after the timestamp
pub const MAX_SIGNING_TIME_SKEW_SECS: i64 = 300;

/// What a successful verification established
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// Signing time recorded in the payload
    pub signing_time: DateTime<Utc>,
    /// The verified timestamp
    pub timestamp: TimestampToken,
    /// Whether the signature was checked against a certified key
    ///
    /// `false` for development packages, which carry no certificate.
    pub signature_verified: bool,
    /// Validation level of the package
    pub format: SignatureFormat,
    /// Status reported by the archived OCSP response, if any
    pub revocation_status: Option<RevocationStatus>,
}

/// Verifies stored packages against the trust anchors
#[derive(Debug, Clone)]
pub struct PackageVerifier {
    trust: Arc<TrustListStore>,
}

impl PackageVerifier {
    /// Create a verifier drawing anchors from `trust`
    pub fn new(trust: Arc<TrustListStore>) -> Self {
        Self { trust }
    }

    /// Verify `package` as a signature over `content` and `metadata`
    pub fn verify<M: Serialize + ?Sized>(
        &self,
        package: &SignaturePackage,
        content: &[u8],
        metadata: &M,
    ) -> Result<VerificationOutcome> {
        let anchors = self.trust.load()?;
        verify_package(package, content, metadata, &anchors)
    }
}

/// Verify `package` against an explicit anchor set
pub fn verify_package<M: Serialize + ?Sized>(
    package: &SignaturePackage,
    content: &[u8],
    metadata: &M,
    anchors: &TrustAnchorSet,
) -> Result<VerificationOutcome> {
    let content_hash = Sha256Hash::from_bytes(qsign_crypto::sha256(content));
    if content_hash != package.content_hash {
        return Err(Error::ProtocolViolation(format!(
            "content hash mismatch: package records {}, content hashes to {}",
            package.content_hash.to_hex(),
            content_hash.to_hex()
        )));
    }

    let payload = SignaturePayload::from_parts(
        &content_hash,
        metadata,
        package.signing_time,
        package.certificate_id.clone(),
    )?
    .to_canonical_bytes()?;

    let digest = qsign_crypto::sha256(&payload);
    if package.timestamp_message_imprint != digest {
        return Err(Error::ProtocolViolation(
            "recorded timestamp message imprint does not match the rebuilt payload".to_string(),
        ));
    }

    let timestamp = verify_timestamp_response(
        &package.timestamp_token,
        &payload,
        &VerifyOpts::new(anchors).with_expected_digest(digest.to_vec()),
    )?;
    if timestamp.gen_time + Duration::seconds(MAX_SIGNING_TIME_SKEW_SECS) < package.signing_time {
        return Err(Error::ProtocolViolation(format!(
            "signing time {} is after the timestamp {}",
            package.signing_time, timestamp.gen_time
        )));
    }

    let signature_verified = match package.certificate_chain.split_first() {
        Some((leaf, intermediates)) => {
            verify_signer(package, leaf, intermediates, &payload, anchors, timestamp.gen_time)?;
            true
        }
        None => {
            tracing::warn!("Package carries no certificate; signature not verified");
            false
        }
    };

    let revocation_status = verify_revocation(package, anchors)?;

    tracing::debug!(
        "Verified {} package timestamped at {}",
        package.signature_format,
        timestamp.gen_time
    );
    Ok(VerificationOutcome {
        signing_time: package.signing_time,
        timestamp,
        signature_verified,
        format: package.signature_format,
        revocation_status,
    })
}

fn verify_signer(
    package: &SignaturePackage,
    leaf: &[u8],
    intermediates: &[Vec<u8>],
    payload: &[u8],
    anchors: &TrustAnchorSet,
    at: DateTime<Utc>,
) -> Result<()> {
    let expected_id = format!("sha256:{}", certificate_fingerprint(leaf).to_hex());
    if package.certificate_id != expected_id {
        return Err(Error::ProtocolViolation(format!(
            "certificate id {} does not name the embedded certificate",
            package.certificate_id
        )));
    }

    anchors.verify_chain(leaf, intermediates, at, KeyPurpose::DocumentSigning)?;

    let certificate = parse_certificate(leaf)
        .map_err(|e| Error::ProtocolViolation(format!("invalid signing certificate: {}", e)))?;
    let scheme = SigningScheme::from_str(&package.algorithm)
        .map_err(|e| Error::ProtocolViolation(e.to_string()))?;
    VerificationKey::from_spki(&certificate.tbs_certificate.subject_public_key_info, scheme)
        .verify(payload, &package.signature)
        .map_err(|e| {
            tracing::error!("Package signature does not verify");
            Error::ProtocolViolation(e.to_string())
        })
}

fn verify_revocation(
    package: &SignaturePackage,
    anchors: &TrustAnchorSet,
) -> Result<Option<RevocationStatus>> {
    let expected = SignatureFormat::for_evidence(package.ocsp_response.is_some());
    if package.signature_format != expected {
        return Err(Error::ProtocolViolation(format!(
            "format {} does not match the revocation evidence present",
            package.signature_format
        )));
    }

    let Some(response) = &package.ocsp_response else {
        return Ok(None);
    };
    let (leaf, issuer) = match package.certificate_chain.as_slice() {
        [leaf, issuer, ..] => (leaf, issuer),
        _ => {
            return Err(Error::ProtocolViolation(
                "revocation evidence without signer and issuer certificates".to_string(),
            ))
        }
    };

    let parse = |der: &[u8]| {
        parse_certificate(der)
            .map_err(|e| Error::ProtocolViolation(format!("invalid certificate: {}", e)))
    };
    let status = verify_stored_response(response, &parse(leaf)?, &parse(issuer)?, anchors)?;
    if status != RevocationStatus::Good {
        return Err(Error::ProtocolViolation(format!(
            "archived revocation evidence reports {:?}",
            status
        )));
    }
    Ok(Some(status))
}
