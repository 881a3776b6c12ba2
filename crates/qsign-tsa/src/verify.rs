//! RFC 3161 timestamp verification
//!
//! Verification is fail-closed and runs in a fixed order:
//! - response status and token structure
//! - nonce binding to the request
//! - message imprint against the payload
//! - signed-attribute message-digest against the TSTInfo
//! - TSA certificate chain to a trust anchor, with the time-stamping EKU
//! - CMS signature over the signed attributes

use crate::asn1::{TimeStampResp, TstInfo, OID_SIGNED_DATA, OID_TST_INFO};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::asn1::{Int, OctetString, SetOfVec};
use der::{Decode, Encode};
use qsign_crypto::{resolve_scheme, VerificationKey};
use qsign_trust_list::{KeyPurpose, TrustAnchorSet};
use qsign_types::{HashAlgorithm, MessageImprint};
use x509_cert::Certificate;

const OID_CONTENT_TYPE: ObjectIdentifier = const_oid::db::rfc6268::ID_CONTENT_TYPE;
const OID_MESSAGE_DIGEST: ObjectIdentifier = const_oid::db::rfc6268::ID_MESSAGE_DIGEST;
const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier =
    const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER;

/// Verification options for RFC 3161 timestamps
#[derive(Debug, Clone)]
pub struct VerifyOpts<'a> {
    /// Anchors the TSA certificate must chain to
    pub anchors: &'a TrustAnchorSet,

    /// Nonce sent in the request; required to match when set
    pub expected_nonce: Option<Int>,

    /// Digest computed by the requester; required to match when set
    pub expected_digest: Option<Vec<u8>>,

    /// Extra certificates available for path building
    pub intermediates: Vec<Vec<u8>>,
}

impl<'a> VerifyOpts<'a> {
    /// Create new verification options
    pub fn new(anchors: &'a TrustAnchorSet) -> Self {
        Self {
            anchors,
            expected_nonce: None,
            expected_digest: None,
            intermediates: Vec::new(),
        }
    }

    /// Require the token nonce to equal `nonce`
    pub fn with_nonce(mut self, nonce: Int) -> Self {
        self.expected_nonce = Some(nonce);
        self
    }

    /// Require the token imprint to equal `digest`
    pub fn with_expected_digest(mut self, digest: impl Into<Vec<u8>>) -> Self {
        self.expected_digest = Some(digest.into());
        self
    }

    /// Add certificates for path building
    pub fn with_intermediates(mut self, intermediates: Vec<Vec<u8>>) -> Self {
        self.intermediates = intermediates;
        self
    }
}

/// A verified RFC 3161 timestamp token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampToken {
    /// DER encoded token (CMS ContentInfo)
    pub token: Vec<u8>,
    /// TSA policy under which the token was issued
    pub policy: String,
    /// Serial number, lowercase hex
    pub serial_number: String,
    /// Time at which the token was generated
    pub gen_time: DateTime<Utc>,
    /// Nonce echoed by the TSA, big-endian
    pub nonce: Option<Vec<u8>>,
    /// Digest covered by the token
    pub message_imprint: MessageImprint,
    /// DER encoded TSA signer certificate
    pub signer_certificate: Vec<u8>,
}

/// Verify an RFC 3161 timestamp against the exact payload it should cover
///
/// `bytes` is either a full `TimeStampResp` or a bare token (`ContentInfo`),
/// so stored tokens can be re-verified. No state is mutated; verifying the
/// same input twice gives the same result.
pub fn verify_timestamp_response(
    bytes: &[u8],
    payload: &[u8],
    opts: &VerifyOpts<'_>,
) -> Result<TimestampToken> {
    tracing::debug!("Starting RFC 3161 timestamp verification");

    let token_der = extract_token(bytes)?;
    let content_info = ContentInfo::from_der(&token_der)
        .map_err(|e| Error::ParseError(format!("failed to decode ContentInfo: {}", e)))?;

    if content_info.content_type != OID_SIGNED_DATA {
        return Err(Error::ParseError(
            "ContentInfo content type is not SignedData".to_string(),
        ));
    }

    let signed_data_der = content_info
        .content
        .to_der()
        .map_err(|e| Error::ParseError(format!("failed to encode SignedData content: {}", e)))?;
    let signed_data = SignedData::from_der(&signed_data_der)
        .map_err(|e| Error::ParseError(format!("failed to decode SignedData: {}", e)))?;

    if signed_data.encap_content_info.econtent_type != OID_TST_INFO {
        return Err(Error::ParseError(
            "encap content type is not TSTInfo".to_string(),
        ));
    }

    // The eContent is an OCTET STRING wrapping the DER TSTInfo
    let tst_info_der = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or(Error::NoTstInfo)?
        .value();
    let tst_info = TstInfo::from_der(tst_info_der)
        .map_err(|e| Error::ParseError(format!("failed to decode TSTInfo: {}", e)))?;

    verify_nonce(&tst_info, opts.expected_nonce.as_ref())?;
    let message_imprint =
        verify_message_imprint(&tst_info, payload, opts.expected_digest.as_deref())?;

    let gen_time = tst_info
        .generation_time()
        .ok_or_else(|| Error::ParseError("invalid genTime in TSTInfo".to_string()))?;
    tracing::debug!("Token generated at {}", gen_time);

    let signer_info = signed_data
        .signer_infos
        .0
        .get(0)
        .ok_or_else(|| Error::SignatureVerificationError("no signer info found".to_string()))?;
    let signed_attrs = signer_info.signed_attrs.as_ref().ok_or_else(|| {
        Error::SignatureVerificationError("no signed attributes found".to_string())
    })?;
    verify_signed_attributes(signed_attrs, signer_info, tst_info_der)?;

    let certificates = extract_certificates(&signed_data);
    let signer_cert = find_signer_certificate(&signer_info.sid, &certificates)?;
    let signer_der = signer_cert.to_der().map_err(|e| {
        Error::CertificateValidationError(format!("failed to encode signer certificate: {}", e))
    })?;

    validate_tsa_certificate_chain(&signer_der, &certificates, gen_time, opts)?;
    verify_cms_signature(signer_info, signed_attrs, &signer_cert)?;

    tracing::debug!("Timestamp token verified");
    Ok(TimestampToken {
        token: token_der,
        policy: tst_info.policy.to_string(),
        serial_number: hex::encode(tst_info.serial_number.as_bytes()),
        gen_time,
        nonce: tst_info.nonce.as_ref().map(|n| n.as_bytes().to_vec()),
        message_imprint,
        signer_certificate: signer_der,
    })
}

/// Return the DER token from a `TimeStampResp`, or `bytes` if it is a bare token
fn extract_token(bytes: &[u8]) -> Result<Vec<u8>> {
    match TimeStampResp::from_der(bytes) {
        Ok(resp) => {
            if !resp.status.is_success() {
                return Err(Error::InvalidResponse(format!(
                    "timestamp request not granted: status {}",
                    resp.status.status
                )));
            }
            let token = resp.time_stamp_token.ok_or_else(|| {
                Error::InvalidResponse("TimeStampResp missing timeStampToken".to_string())
            })?;
            token
                .to_der()
                .map_err(|e| Error::ParseError(format!("failed to re-encode token: {}", e)))
        }
        Err(_) => Ok(bytes.to_vec()),
    }
}

fn verify_nonce(tst_info: &TstInfo, expected: Option<&Int>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = tst_info.nonce.as_ref().ok_or_else(|| Error::NonceMismatch {
        expected: hex::encode(expected.as_bytes()),
        actual: "none".to_string(),
    })?;

    // Compare DER encodings so both sides are in canonical form
    let encode = |n: &Int| {
        n.to_der()
            .map_err(|e| Error::Asn1(format!("failed to encode nonce: {}", e)))
    };
    if encode(actual)? != encode(expected)? {
        tracing::error!("Timestamp nonce does not match the request");
        return Err(Error::NonceMismatch {
            expected: hex::encode(expected.as_bytes()),
            actual: hex::encode(actual.as_bytes()),
        });
    }
    Ok(())
}

/// Recompute the digest the token claims to cover and compare it with the
/// imprint and with the requester's digest
fn verify_message_imprint(
    tst_info: &TstInfo,
    payload: &[u8],
    expected_digest: Option<&[u8]>,
) -> Result<MessageImprint> {
    let imprint = &tst_info.message_imprint;
    let algorithm = imprint.hash_algorithm.to_hash_algorithm().ok_or_else(|| {
        Error::ParseError(format!(
            "unsupported message imprint hash algorithm: {}",
            imprint.hash_algorithm.algorithm
        ))
    })?;

    let claimed = imprint.hashed_message.as_bytes();
    let computed = qsign_crypto::digest(algorithm, payload);

    if computed != claimed {
        tracing::error!("Timestamp message imprint does not cover the payload");
        return Err(Error::ImprintMismatch {
            expected: hex::encode(&computed),
            actual: hex::encode(claimed),
        });
    }

    if let Some(expected) = expected_digest {
        if expected != claimed {
            tracing::error!("Timestamp message imprint differs from the requested digest");
            return Err(Error::ImprintMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(claimed),
            });
        }
    }

    Ok(MessageImprint::new(algorithm, computed))
}

fn single_attribute_value<'a>(
    signed_attrs: &'a x509_cert::attr::Attributes,
    oid: ObjectIdentifier,
    name: &str,
) -> Result<&'a der::Any> {
    let attr = signed_attrs
        .iter()
        .find(|attr| attr.oid == oid)
        .ok_or_else(|| {
            Error::SignatureVerificationError(format!("{} attribute not found", name))
        })?;

    if attr.values.len() != 1 {
        return Err(Error::SignatureVerificationError(format!(
            "{} attribute should have exactly one value",
            name
        )));
    }
    attr.values.get(0).ok_or_else(|| {
        Error::SignatureVerificationError(format!("failed to get {} attribute value", name))
    })
}

/// Check the content-type and message-digest signed attributes
fn verify_signed_attributes(
    signed_attrs: &x509_cert::attr::Attributes,
    signer_info: &SignerInfo,
    tst_info_der: &[u8],
) -> Result<()> {
    let content_type = single_attribute_value(signed_attrs, OID_CONTENT_TYPE, "content-type")?
        .decode_as::<ObjectIdentifier>()
        .map_err(|e| Error::ParseError(format!("invalid content-type attribute: {}", e)))?;
    if content_type != OID_TST_INFO {
        return Err(Error::SignatureVerificationError(format!(
            "content-type attribute is {}, expected TSTInfo",
            content_type
        )));
    }

    let message_digest =
        single_attribute_value(signed_attrs, OID_MESSAGE_DIGEST, "message-digest")?
            .decode_as::<OctetString>()
            .map_err(|e| Error::ParseError(format!("invalid message-digest attribute: {}", e)))?;

    let digest_algorithm = HashAlgorithm::from_oid(&signer_info.digest_alg.oid.to_string())
        .map_err(|e| Error::ParseError(format!("signer digest algorithm: {}", e)))?;
    let content_hash = qsign_crypto::digest(digest_algorithm, tst_info_der);

    if content_hash.as_slice() != message_digest.as_bytes() {
        tracing::error!("Signed attribute message-digest does not cover the TSTInfo");
        return Err(Error::MessageDigestMismatch {
            expected: hex::encode(message_digest.as_bytes()),
            actual: hex::encode(&content_hash),
        });
    }
    Ok(())
}

/// Re-encode signed attributes for signature verification.
///
/// RFC 5652: The signed attributes are stored with [0] IMPLICIT tag in SignerInfo,
/// but for signature verification they must be re-encoded as a generic SET OF.
fn signed_attrs_for_verification(attrs: &x509_cert::attr::Attributes) -> Result<Vec<u8>> {
    let attrs_vec: Vec<x509_cert::attr::Attribute> = attrs.iter().cloned().collect();
    let generic_set = SetOfVec::try_from(attrs_vec).map_err(|e| {
        Error::SignatureVerificationError(format!("failed to create SetOfVec: {}", e))
    })?;

    generic_set.to_der().map_err(|e| {
        Error::SignatureVerificationError(format!("failed to re-encode attributes: {}", e))
    })
}

/// Verify the signer's signature over the signed attributes
fn verify_cms_signature(
    signer_info: &SignerInfo,
    signed_attrs: &x509_cert::attr::Attributes,
    signer_cert: &Certificate,
) -> Result<()> {
    let spki = &signer_cert.tbs_certificate.subject_public_key_info;
    let scheme = resolve_scheme(
        &signer_info.signature_algorithm,
        Some(&signer_info.digest_alg.oid),
        spki,
    )
    .map_err(|e| Error::SignatureVerificationError(e.to_string()))?;

    let message = signed_attrs_for_verification(signed_attrs)?;
    VerificationKey::from_spki(spki, scheme)
        .verify(&message, signer_info.signature.as_bytes())
        .map_err(|e| {
            tracing::error!("TSA signature verification failed");
            Error::SignatureVerificationError(e.to_string())
        })
}

/// Extract certificates from SignedData
fn extract_certificates(signed_data: &SignedData) -> Vec<Certificate> {
    let mut certificates = Vec::new();

    if let Some(cert_set) = &signed_data.certificates {
        for cert_choice in cert_set.0.iter() {
            match cert_choice {
                CertificateChoices::Certificate(cert) => {
                    certificates.push(cert.clone());
                }
                CertificateChoices::Other(_) => {
                    tracing::debug!("Skipping non-standard certificate format");
                }
            }
        }
    }

    certificates
}

/// Find the signer certificate that matches the SignerIdentifier
fn find_signer_certificate(
    signer_id: &SignerIdentifier,
    certificates: &[Certificate],
) -> Result<Certificate> {
    match signer_id {
        SignerIdentifier::IssuerAndSerialNumber(issuer_serial) => certificates
            .iter()
            .find(|cert| {
                cert.tbs_certificate.issuer == issuer_serial.issuer
                    && cert.tbs_certificate.serial_number == issuer_serial.serial_number
            })
            .cloned()
            .ok_or_else(|| {
                Error::CertificateValidationError(
                    "no embedded certificate matches issuer and serial number".to_string(),
                )
            }),
        SignerIdentifier::SubjectKeyIdentifier(ski) => certificates
            .iter()
            .find(|cert| {
                cert.tbs_certificate
                    .extensions
                    .iter()
                    .flatten()
                    .filter(|ext| ext.extn_id == OID_SUBJECT_KEY_IDENTIFIER)
                    .any(|ext| {
                        x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(
                            ext.extn_value.as_bytes(),
                        )
                        .is_ok_and(|cert_ski| &cert_ski == ski)
                    })
            })
            .cloned()
            .ok_or_else(|| {
                Error::CertificateValidationError(
                    "no embedded certificate matches subject key identifier".to_string(),
                )
            }),
    }
}

/// Validate the TSA certificate chain at the token's generation time
fn validate_tsa_certificate_chain(
    signer_der: &[u8],
    embedded: &[Certificate],
    gen_time: DateTime<Utc>,
    opts: &VerifyOpts<'_>,
) -> Result<()> {
    let mut intermediates = Vec::with_capacity(embedded.len() + opts.intermediates.len());
    for cert in embedded {
        let der = cert.to_der().map_err(|e| {
            Error::CertificateValidationError(format!(
                "failed to encode embedded certificate: {}",
                e
            ))
        })?;
        intermediates.push(der);
    }
    intermediates.extend(opts.intermediates.iter().cloned());

    opts.anchors
        .verify_chain(signer_der, &intermediates, gen_time, KeyPurpose::TimeStamping)
        .map_err(|e| {
            tracing::error!("TSA certificate chain validation failed: {}", e);
            Error::CertificateValidationError(e.to_string())
        })
}
