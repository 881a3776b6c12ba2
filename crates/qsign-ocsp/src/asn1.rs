//! ASN.1 types for the Online Certificate Status Protocol
//!
//! RFC 6960 structures, plus the nonce extension encoding of RFC 8954.

use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, Null, OctetString};
use der::{Choice, Decode, Encode, Enumerated, Sequence};
use qsign_crypto::oids::{ID_PKIX_OCSP_NONCE, ID_SHA_1};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::{Extension, Extensions};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

fn default_version() -> u8 {
    0
}

/// Convert a GeneralizedTime to chrono
pub fn to_datetime(time: &GeneralizedTime) -> Option<DateTime<Utc>> {
    let since_epoch = time.to_unix_duration();
    DateTime::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
}

/// Identifies the certificate whose status is asked
/// RFC 6960 Section 4.1.1
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    /// Hash algorithm used for the issuer hashes
    pub hash_algorithm: AlgorithmIdentifierOwned,
    /// Hash of the issuer's distinguished name
    pub issuer_name_hash: OctetString,
    /// Hash of the issuer's public key
    pub issuer_key_hash: OctetString,
    /// Serial number of the certificate
    pub serial_number: SerialNumber,
}

impl CertId {
    /// SHA-1 CertID of `cert` issued by `issuer`
    pub fn sha1(cert: &Certificate, issuer: &Certificate) -> der::Result<Self> {
        let issuer_name = issuer.tbs_certificate.subject.to_der()?;
        let issuer_key = qsign_crypto::subject_public_key_bytes(issuer);

        Ok(Self {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: ID_SHA_1,
                parameters: None,
            },
            issuer_name_hash: OctetString::new(qsign_crypto::sha1(&issuer_name).to_vec())?,
            issuer_key_hash: OctetString::new(qsign_crypto::sha1(issuer_key).to_vec())?,
            serial_number: cert.tbs_certificate.serial_number.clone(),
        })
    }

    /// Whether `other` designates the same certificate
    ///
    /// Hash algorithm parameters are ignored: responders differ in whether
    /// they encode an explicit NULL.
    pub fn matches(&self, other: &CertId) -> bool {
        self.hash_algorithm.oid == other.hash_algorithm.oid
            && self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

/// A single certificate status request
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Request {
    /// Certificate asked about
    pub req_cert: CertId,
    /// Per-request extensions
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub single_request_extensions: Option<Extensions>,
}

/// TBSRequest
/// RFC 6960 Section 4.1.1
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TbsRequest {
    /// Version (v1 = 0)
    #[asn1(context_specific = "0", default = "default_version", tag_mode = "EXPLICIT")]
    pub version: u8,
    /// Requestor name, unused
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub requestor_name: Option<x509_cert::ext::pkix::name::GeneralName>,
    /// Certificates asked about
    pub request_list: Vec<Request>,
    /// Request extensions (nonce)
    #[asn1(context_specific = "2", optional = "true", tag_mode = "EXPLICIT")]
    pub request_extensions: Option<Extensions>,
}

/// OCSPRequest, always unsigned here
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspRequest {
    /// Request body
    pub tbs_request: TbsRequest,
}

impl OcspRequest {
    /// Request for one certificate carrying `nonce`
    pub fn new(cert_id: CertId, nonce: &[u8]) -> der::Result<Self> {
        Ok(Self {
            tbs_request: TbsRequest {
                version: 0,
                requestor_name: None,
                request_list: vec![Request {
                    req_cert: cert_id,
                    single_request_extensions: None,
                }],
                request_extensions: Some(vec![nonce_extension(nonce)?]),
            },
        })
    }

    /// Nonce carried by the request, if any
    pub fn nonce(&self) -> Option<Vec<u8>> {
        find_nonce(self.tbs_request.request_extensions.as_ref())
    }
}

/// Build an `id-pkix-ocsp-nonce` extension
///
/// The extension value is a DER OCTET STRING holding the nonce (RFC 8954).
pub fn nonce_extension(nonce: &[u8]) -> der::Result<Extension> {
    let inner = OctetString::new(nonce.to_vec())?.to_der()?;
    Ok(Extension {
        extn_id: ID_PKIX_OCSP_NONCE,
        critical: false,
        extn_value: OctetString::new(inner)?,
    })
}

/// Extract the nonce from a set of extensions
///
/// Responders that put the raw nonce directly in the extension value are
/// accepted as well.
pub fn find_nonce(extensions: Option<&Extensions>) -> Option<Vec<u8>> {
    let ext = extensions?
        .iter()
        .find(|ext| ext.extn_id == ID_PKIX_OCSP_NONCE)?;
    let value = ext.extn_value.as_bytes();
    match OctetString::from_der(value) {
        Ok(inner) => Some(inner.as_bytes().to_vec()),
        Err(_) => Some(value.to_vec()),
    }
}

/// OCSPResponseStatus
#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub enum OcspResponseStatus {
    /// Response has valid confirmations
    Successful = 0,
    /// Illegal confirmation request
    MalformedRequest = 1,
    /// Internal error in issuer
    InternalError = 2,
    /// Try again later
    TryLater = 3,
    /// Must sign the request
    SigRequired = 5,
    /// Request unauthorized
    Unauthorized = 6,
}

/// ResponseBytes
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseBytes {
    /// Response type, id-pkix-ocsp-basic
    pub response_type: ObjectIdentifier,
    /// DER encoded response of that type
    pub response: OctetString,
}

/// OCSPResponse
/// RFC 6960 Section 4.2.1
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspResponse {
    /// Processing status
    pub response_status: OcspResponseStatus,
    /// Response body when successful
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub response_bytes: Option<ResponseBytes>,
}

/// ResponderID
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum ResponderId {
    /// Responder subject name
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    /// SHA-1 of the responder public key
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

impl ResponderId {
    /// Whether `cert` is the certificate this identifier designates
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            ResponderId::ByName(name) => &cert.tbs_certificate.subject == name,
            ResponderId::ByKey(hash) => {
                qsign_crypto::sha1(qsign_crypto::subject_public_key_bytes(cert)).as_slice()
                    == hash.as_bytes()
            }
        }
    }
}

/// RevokedInfo
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevokedInfo {
    /// When the certificate was revoked
    pub revocation_time: GeneralizedTime,
    /// CRLReason code
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub revocation_reason: Option<CrlReason>,
}

/// CRLReason, as an ENUMERATED value
#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub enum CrlReason {
    /// unspecified
    Unspecified = 0,
    /// keyCompromise
    KeyCompromise = 1,
    /// cACompromise
    CaCompromise = 2,
    /// affiliationChanged
    AffiliationChanged = 3,
    /// superseded
    Superseded = 4,
    /// cessationOfOperation
    CessationOfOperation = 5,
    /// certificateHold
    CertificateHold = 6,
    /// removeFromCRL
    RemoveFromCrl = 8,
    /// privilegeWithdrawn
    PrivilegeWithdrawn = 9,
    /// aACompromise
    AaCompromise = 10,
}

/// CertStatus
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum CertStatus {
    /// Not revoked
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    /// Revoked
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    /// Unknown to the responder
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

/// SingleResponse
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SingleResponse {
    /// Certificate the status is about
    pub cert_id: CertId,
    /// Status
    pub cert_status: CertStatus,
    /// Time at which the status is known to be correct
    pub this_update: GeneralizedTime,
    /// Time at or before which newer information will be available
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub next_update: Option<GeneralizedTime>,
    /// Per-response extensions
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub single_extensions: Option<Extensions>,
}

/// ResponseData
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseData {
    /// Version (v1 = 0)
    #[asn1(context_specific = "0", default = "default_version", tag_mode = "EXPLICIT")]
    pub version: u8,
    /// Responder identity
    pub responder_id: ResponderId,
    /// When the response was signed
    pub produced_at: GeneralizedTime,
    /// Statuses
    pub responses: Vec<SingleResponse>,
    /// Response extensions (nonce)
    #[asn1(context_specific = "1", optional = "true", tag_mode = "EXPLICIT")]
    pub response_extensions: Option<Extensions>,
}

/// BasicOCSPResponse
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct BasicOcspResponse {
    /// Signed response data
    pub tbs_response_data: ResponseData,
    /// Signature algorithm
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// Signature over the DER `tbs_response_data`
    pub signature: BitString,
    /// Certificates helping to verify the signature
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub certs: Option<Vec<Certificate>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_extension_encoding() {
        let nonce = [0x42u8; 16];
        let ext = nonce_extension(&nonce).unwrap();

        assert_eq!(ext.extn_id, ID_PKIX_OCSP_NONCE);
        // OCTET STRING, length 16, then the nonce
        assert_eq!(&ext.extn_value.as_bytes()[..2], &[0x04, 0x10]);
        assert_eq!(find_nonce(Some(&vec![ext])).unwrap(), nonce);
    }

    #[test]
    fn test_find_nonce_accepts_raw_value() {
        let ext = Extension {
            extn_id: ID_PKIX_OCSP_NONCE,
            critical: false,
            extn_value: OctetString::new(vec![0xAB; 4]).unwrap(),
        };
        assert_eq!(find_nonce(Some(&vec![ext])).unwrap(), vec![0xAB; 4]);
        assert!(find_nonce(None).is_none());
    }

    #[test]
    fn test_response_status_roundtrip() {
        let response = OcspResponse {
            response_status: OcspResponseStatus::TryLater,
            response_bytes: None,
        };
        let der = response.to_der().unwrap();
        assert_eq!(der, vec![0x30, 0x03, 0x0a, 0x01, 0x03]);
        assert_eq!(OcspResponse::from_der(&der).unwrap(), response);
    }

    #[test]
    fn test_cert_status_tags() {
        assert_eq!(CertStatus::Good(Null).to_der().unwrap(), vec![0x80, 0x00]);
        assert_eq!(CertStatus::Unknown(Null).to_der().unwrap(), vec![0x82, 0x00]);
    }

    #[test]
    fn test_responder_id_by_key_is_constructed() {
        let id = ResponderId::ByKey(OctetString::new(vec![0x11; 20]).unwrap());
        let der = id.to_der().unwrap();

        // [2] constructed, wrapping a 20 byte OCTET STRING
        assert_eq!(&der[..4], &[0xa2, 0x16, 0x04, 0x14]);
        assert_eq!(ResponderId::from_der(&der).unwrap(), id);
    }
}
