//! ASN.1 types for RFC 3161 Time-Stamp Protocol
//!
//! This module defines the ASN.1 structures used in the Time-Stamp Protocol
//! as specified in RFC 3161.

use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::{
    asn1::{BitString, GeneralizedTime, Int, OctetString},
    Decode, Encode, Sequence,
};
use qsign_types::HashAlgorithm;
use rand::Rng;
use x509_cert::{ext::pkix::name::GeneralName, ext::Extensions};

/// OID for SHA-256: 2.16.840.1.101.3.4.2.1
pub const OID_SHA256: ObjectIdentifier = const_oid::db::rfc5912::ID_SHA_256;

/// OID for SHA-384: 2.16.840.1.101.3.4.2.2
pub const OID_SHA384: ObjectIdentifier = const_oid::db::rfc5912::ID_SHA_384;

/// OID for SHA-512: 2.16.840.1.101.3.4.2.3
pub const OID_SHA512: ObjectIdentifier = const_oid::db::rfc5912::ID_SHA_512;

/// OID for id-ct-TSTInfo: 1.2.840.113549.1.9.16.1.4
pub const OID_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// OID for id-signedData: 1.2.840.113549.1.7.2
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// Minimal big-endian encoding of a non-negative integer
///
/// Leading zero bytes are dropped and a single 0x00 is prepended when the
/// high bit is set, so the value reads as positive and DER decoders accept it.
pub fn positive_int_bytes(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    match trimmed.first() {
        None => vec![0],
        Some(first) if first & 0x80 != 0 => {
            let mut padded = Vec::with_capacity(trimmed.len() + 1);
            padded.push(0);
            padded.extend_from_slice(trimmed);
            padded
        }
        Some(_) => trimmed.to_vec(),
    }
}

/// Generate a fresh request nonce from 8 random bytes
pub fn generate_nonce() -> der::Result<Int> {
    let random: [u8; 8] = rand::rng().random();
    Int::new(&positive_int_bytes(&random))
}

/// Algorithm identifier with optional parameters
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AlgorithmIdentifier {
    /// Algorithm OID
    pub algorithm: ObjectIdentifier,
    /// Optional parameters (usually NULL for hash algorithms)
    #[asn1(optional = "true")]
    pub parameters: Option<der::Any>,
}

impl AlgorithmIdentifier {
    /// Try to convert to a HashAlgorithm enum
    pub fn to_hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self.algorithm {
            OID_SHA256 => Some(HashAlgorithm::Sha256),
            OID_SHA384 => Some(HashAlgorithm::Sha384),
            OID_SHA512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl From<HashAlgorithm> for AlgorithmIdentifier {
    fn from(algo: HashAlgorithm) -> Self {
        let algorithm = match algo {
            HashAlgorithm::Sha256 => OID_SHA256,
            HashAlgorithm::Sha384 => OID_SHA384,
            HashAlgorithm::Sha512 => OID_SHA512,
        };
        Self {
            algorithm,
            parameters: None,
        }
    }
}

/// Message imprint containing hash algorithm and hashed message
///
/// RFC 3161 Section 2.4.1. The JSON form carried by signature packages is
/// [`qsign_types::MessageImprint`].
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Asn1MessageImprint {
    /// Hash algorithm used
    pub hash_algorithm: AlgorithmIdentifier,
    /// Hashed message
    pub hashed_message: OctetString,
}

impl Asn1MessageImprint {
    /// Create a new message imprint
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> der::Result<Self> {
        Ok(Self {
            hash_algorithm: algorithm.into(),
            hashed_message: OctetString::new(digest)?,
        })
    }
}

/// Time-stamp request
/// RFC 3161 Section 2.4.1
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampReq {
    /// Version (must be 1)
    pub version: u8,
    /// Message imprint to be timestamped
    pub message_imprint: Asn1MessageImprint,
    /// Optional policy OID
    #[asn1(optional = "true")]
    pub req_policy: Option<ObjectIdentifier>,
    /// Optional nonce
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    /// Whether to include certificates in response
    #[asn1(default = "default_false")]
    pub cert_req: bool,
}

fn default_false() -> bool {
    false
}

impl TimeStampReq {
    /// Create a request with a fresh nonce, asking for the TSA certificate
    pub fn new(message_imprint: Asn1MessageImprint) -> der::Result<Self> {
        Ok(Self {
            version: 1,
            message_imprint,
            req_policy: None,
            nonce: Some(generate_nonce()?),
            cert_req: true,
        })
    }

    /// Request a specific TSA policy
    pub fn with_policy(mut self, policy: Option<ObjectIdentifier>) -> Self {
        self.req_policy = policy;
        self
    }

    /// Encode to DER
    pub fn to_der(&self) -> Result<Vec<u8>, der::Error> {
        Encode::to_der(self)
    }
}

/// PKI status values
/// RFC 3161 Section 2.4.2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PkiStatus {
    /// Granted
    Granted = 0,
    /// Granted with modifications
    GrantedWithMods = 1,
    /// Rejection
    Rejection = 2,
    /// Waiting
    Waiting = 3,
    /// Revocation warning
    RevocationWarning = 4,
    /// Revocation notification
    RevocationNotification = 5,
}

impl TryFrom<u8> for PkiStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PkiStatus::Granted),
            1 => Ok(PkiStatus::GrantedWithMods),
            2 => Ok(PkiStatus::Rejection),
            3 => Ok(PkiStatus::Waiting),
            4 => Ok(PkiStatus::RevocationWarning),
            5 => Ok(PkiStatus::RevocationNotification),
            _ => Err(()),
        }
    }
}

/// PKI status info
/// RFC 3161 Section 2.4.2
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    /// Status value
    pub status: u8,
    /// Optional failure info
    #[asn1(optional = "true")]
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// Status info for the given status without failure details
    pub fn new(status: PkiStatus) -> Self {
        Self {
            status: status as u8,
            fail_info: None,
        }
    }

    /// Check if the status indicates success
    pub fn is_success(&self) -> bool {
        self.status == PkiStatus::Granted as u8 || self.status == PkiStatus::GrantedWithMods as u8
    }

    /// Get the status as an enum
    pub fn status_enum(&self) -> Option<PkiStatus> {
        PkiStatus::try_from(self.status).ok()
    }
}

/// Accuracy of the timestamp
/// RFC 3161 Section 2.4.2
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    /// Seconds
    #[asn1(optional = "true")]
    pub seconds: Option<u64>,
    /// Milliseconds (1-999)
    #[asn1(context_specific = "0", optional = "true")]
    pub millis: Option<u16>,
    /// Microseconds (1-999)
    #[asn1(context_specific = "1", optional = "true")]
    pub micros: Option<u16>,
}

/// TSTInfo - the actual timestamp token info
/// RFC 3161 Section 2.4.2
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    /// Version (must be 1)
    pub version: u8,
    /// Policy OID
    pub policy: ObjectIdentifier,
    /// Message imprint
    pub message_imprint: Asn1MessageImprint,
    /// Serial number
    pub serial_number: Int,
    /// Generation time
    pub gen_time: GeneralizedTime,
    /// Accuracy
    #[asn1(optional = "true")]
    pub accuracy: Option<Accuracy>,
    /// Ordering
    #[asn1(default = "default_false")]
    pub ordering: bool,
    /// Nonce
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    /// TSA name
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub tsa: Option<GeneralName>,
    /// Extensions
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT")]
    pub extensions: Option<Extensions>,
}

impl TstInfo {
    /// Decode from DER bytes
    pub fn from_der_bytes(bytes: &[u8]) -> Result<Self, der::Error> {
        Self::from_der(bytes)
    }

    /// Generation time as a chrono timestamp
    pub fn generation_time(&self) -> Option<DateTime<Utc>> {
        let since_epoch = self.gen_time.to_unix_duration();
        DateTime::from_timestamp(
            since_epoch.as_secs() as i64,
            since_epoch.subsec_nanos(),
        )
    }
}

/// Time-stamp response
/// RFC 3161 Section 2.4.2
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampResp {
    /// Status information
    pub status: PkiStatusInfo,
    /// Time-stamp token (CMS ContentInfo)
    #[asn1(optional = "true")]
    pub time_stamp_token: Option<der::Any>,
}

impl TimeStampResp {
    /// Decode from DER bytes
    pub fn from_der_bytes(bytes: &[u8]) -> Result<Self, der::Error> {
        Self::from_der(bytes)
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.status.is_success() && self.time_stamp_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_timestamp_req_has_nonce_and_cert_req() {
        let imprint = Asn1MessageImprint::new(HashAlgorithm::Sha256, vec![0u8; 32]).unwrap();
        let req = TimeStampReq::new(imprint).unwrap();

        assert!(req.nonce.is_some());
        assert!(req.cert_req);

        let der = req.to_der().unwrap();
        let decoded = TimeStampReq::from_der(&der).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_nonces_differ() {
        let a = generate_nonce().unwrap();
        let b = generate_nonce().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_nonce_decodes() {
        // Every generated nonce must survive a strict DER decode
        for _ in 0..200 {
            let nonce = generate_nonce().unwrap();
            let der = nonce.to_der().unwrap();
            assert_eq!(Int::from_der(&der).unwrap(), nonce);
        }
    }

    #[rstest]
    #[case(&[0x12, 0x34], &[0x12, 0x34])]
    #[case(&[0x00, 0x00, 0x12], &[0x12])]
    #[case(&[0x80, 0x01], &[0x00, 0x80, 0x01])]
    #[case(&[0x00, 0xff], &[0x00, 0xff])]
    #[case(&[0x00, 0x00], &[0x00])]
    fn test_positive_int_bytes(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(positive_int_bytes(input), expected);
    }

    #[test]
    fn test_policy_is_encoded() {
        let policy = ObjectIdentifier::new_unwrap("1.2.3.4.1");
        let imprint = Asn1MessageImprint::new(HashAlgorithm::Sha256, vec![1u8; 32]).unwrap();
        let req = TimeStampReq::new(imprint)
            .unwrap()
            .with_policy(Some(policy));

        let decoded = TimeStampReq::from_der(&req.to_der().unwrap()).unwrap();
        assert_eq!(decoded.req_policy, Some(policy));
    }

    #[test]
    fn test_pki_status() {
        assert!(PkiStatus::try_from(0).is_ok());
        assert!(PkiStatus::try_from(5).is_ok());
        assert!(PkiStatus::try_from(6).is_err());
        assert!(PkiStatusInfo::new(PkiStatus::GrantedWithMods).is_success());
        assert!(!PkiStatusInfo::new(PkiStatus::Rejection).is_success());
    }

    #[test]
    fn test_algorithm_identifier_mapping() {
        let id = AlgorithmIdentifier::from(HashAlgorithm::Sha384);
        assert_eq!(id.algorithm, OID_SHA384);
        assert_eq!(id.to_hash_algorithm(), Some(HashAlgorithm::Sha384));
    }
}
