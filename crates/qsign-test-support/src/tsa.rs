//! A signing RFC 3161 authority

use crate::pki::TestCert;
use crate::transport::{Endpoint, RecordedRequest};
use chrono::{DateTime, SubsecRound, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{GeneralizedTime, Int, OctetString, SetOfVec};
use der::{Any, Decode, Encode, Tag};
use qsign_crypto::oids::{ID_RSASSA_PSS, SHA_256_WITH_RSA_ENCRYPTION};
use qsign_crypto::{KeyPair, SigningScheme};
use qsign_transport::{HttpResponse, Result};
use qsign_tsa::asn1::{
    positive_int_bytes, Asn1MessageImprint, PkiStatus, PkiStatusInfo, TimeStampReq,
    TimeStampResp, TstInfo, OID_SIGNED_DATA, OID_TST_INFO,
};
use qsign_types::HashAlgorithm;
use spki::AlgorithmIdentifierOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use x509_cert::attr::Attribute;

/// Policy placed in tokens when the request names none
pub const DEFAULT_POLICY: &str = "1.3.6.1.4.1.55555.1.1";

const ECDSA_WITH_SHA_256: ObjectIdentifier = const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
const ID_SHA_256: ObjectIdentifier = const_oid::db::rfc5912::ID_SHA_256;
const ID_CONTENT_TYPE: ObjectIdentifier = const_oid::db::rfc6268::ID_CONTENT_TYPE;
const ID_MESSAGE_DIGEST: ObjectIdentifier = const_oid::db::rfc6268::ID_MESSAGE_DIGEST;

/// How the authority answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsaBehavior {
    /// A correct token
    Honest,
    /// Token over a different digest than requested
    WrongImprint,
    /// Token echoing another nonce
    WrongNonce,
    /// Token without a nonce
    OmitNonce,
    /// Correct token with one signature byte flipped
    CorruptSignature,
    /// `rejection` status without a token
    Reject,
    /// HTTP 500
    ServerError,
}

/// Mock Time-Stamp Authority signing with a [`TestCert`]
#[derive(Debug)]
pub struct MockTsa {
    signer: Arc<TestCert>,
    behavior: Mutex<TsaBehavior>,
    time: Mutex<Option<DateTime<Utc>>>,
    serial: AtomicU64,
    rsa_pss: bool,
}

impl MockTsa {
    /// An honest authority
    pub fn new(signer: Arc<TestCert>) -> Self {
        Self {
            signer,
            behavior: Mutex::new(TsaBehavior::Honest),
            time: Mutex::new(None),
            serial: AtomicU64::new(1),
            rsa_pss: false,
        }
    }

    /// Answer with `behavior`, builder style
    pub fn with_behavior(self, behavior: TsaBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Stamp every token with `time` instead of the current time
    pub fn at(self, time: DateTime<Utc>) -> Self {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) = Some(time);
        self
    }

    /// Sign with RSA-PSS instead of PKCS#1 v1.5 when the key is RSA
    pub fn with_rsa_pss(mut self) -> Self {
        self.rsa_pss = true;
        self
    }

    /// Change the behavior of later requests
    pub fn set_behavior(&self, behavior: TsaBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    fn behavior(&self) -> TsaBehavior {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gen_time(&self) -> DateTime<Utc> {
        self.time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_else(|| Utc::now().trunc_subsecs(0))
    }

    /// Build the DER `TimeStampResp` answering `request`
    pub fn respond(&self, request: &TimeStampReq) -> Vec<u8> {
        let behavior = self.behavior();
        if behavior == TsaBehavior::Reject {
            return TimeStampResp {
                status: PkiStatusInfo::new(PkiStatus::Rejection),
                time_stamp_token: None,
            }
            .to_der()
            .expect("encode rejection");
        }

        let message_imprint = match behavior {
            TsaBehavior::WrongImprint => Asn1MessageImprint::new(
                HashAlgorithm::Sha256,
                qsign_crypto::sha256(b"some other payload").to_vec(),
            )
            .expect("imprint"),
            _ => request.message_imprint.clone(),
        };
        let nonce = match behavior {
            TsaBehavior::OmitNonce => None,
            TsaBehavior::WrongNonce => {
                let mut bytes = request
                    .nonce
                    .as_ref()
                    .map(|n| n.as_bytes().to_vec())
                    .unwrap_or_default();
                bytes.push(0x5a);
                Some(Int::new(&positive_int_bytes(&bytes)).expect("nonce"))
            }
            _ => request.nonce.clone(),
        };

        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let tst_info = TstInfo {
            version: 1,
            policy: request
                .req_policy
                .unwrap_or(ObjectIdentifier::new_unwrap(DEFAULT_POLICY)),
            message_imprint,
            serial_number: Int::new(&positive_int_bytes(&serial.to_be_bytes())).expect("serial"),
            gen_time: generalized_time(self.gen_time()),
            accuracy: None,
            ordering: false,
            nonce,
            tsa: None,
            extensions: None,
        };
        let token = self.sign_token(
            &tst_info.to_der().expect("encode TSTInfo"),
            behavior == TsaBehavior::CorruptSignature,
        );

        TimeStampResp {
            status: PkiStatusInfo::new(PkiStatus::Granted),
            time_stamp_token: Some(Any::from_der(&token).expect("token")),
        }
        .to_der()
        .expect("encode response")
    }

    /// Wrap `tst_info_der` in a CMS SignedData signed by the TSA key
    fn sign_token(&self, tst_info_der: &[u8], corrupt: bool) -> Vec<u8> {
        let certificate = self.signer.parsed();
        let sha256 = AlgorithmIdentifierOwned {
            oid: ID_SHA_256,
            parameters: None,
        };

        let signed_attrs = SetOfVec::try_from(vec![
            Attribute {
                oid: ID_CONTENT_TYPE,
                values: SetOfVec::try_from(vec![Any::encode_from(&OID_TST_INFO).expect("oid")])
                    .expect("set"),
            },
            Attribute {
                oid: ID_MESSAGE_DIGEST,
                values: SetOfVec::try_from(vec![Any::encode_from(
                    &OctetString::new(qsign_crypto::sha256(tst_info_der).to_vec())
                        .expect("digest"),
                )
                .expect("digest")])
                .expect("set"),
            },
        ])
        .expect("attributes");

        let key = self.signer.signing_key();
        let (scheme, signature_algorithm) = match key {
            KeyPair::Rsa(_) if self.rsa_pss => (SigningScheme::RsaPssSha256, ID_RSASSA_PSS),
            KeyPair::Rsa(_) => (SigningScheme::RsaPkcs1Sha256, SHA_256_WITH_RSA_ENCRYPTION),
            KeyPair::EcdsaP256(_) => (SigningScheme::EcdsaP256Sha256, ECDSA_WITH_SHA_256),
        };
        let mut signature = key
            .sign_with_scheme(&signed_attrs.to_der().expect("encode attributes"), scheme)
            .expect("sign")
            .into_bytes();
        if corrupt {
            if let Some(last) = signature.last_mut() {
                *last ^= 0x01;
            }
        }

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: certificate.tbs_certificate.issuer.clone(),
                serial_number: certificate.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: sha256.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: signature_algorithm,
                parameters: None,
            },
            signature: OctetString::new(signature).expect("signature"),
            unsigned_attrs: None,
        };

        let signed_data = SignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::try_from(vec![sha256]).expect("set"),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: OID_TST_INFO,
                econtent: Some(Any::new(Tag::OctetString, tst_info_der.to_vec()).expect("econtent")),
            },
            certificates: Some(CertificateSet(
                SetOfVec::try_from(vec![CertificateChoices::Certificate(certificate)])
                    .expect("set"),
            )),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).expect("set")),
        };

        ContentInfo {
            content_type: OID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).expect("SignedData"),
        }
        .to_der()
        .expect("encode token")
    }
}

impl Endpoint for MockTsa {
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse> {
        if self.behavior() == TsaBehavior::ServerError {
            return Ok(HttpResponse {
                status: 500,
                content_type: None,
                body: Vec::new(),
            });
        }

        match TimeStampReq::from_der(&request.body) {
            Ok(req) => Ok(HttpResponse::ok(
                "application/timestamp-reply",
                self.respond(&req),
            )),
            Err(_) => Ok(HttpResponse {
                status: 400,
                content_type: None,
                body: Vec::new(),
            }),
        }
    }
}

/// GeneralizedTime at whole-second precision
pub fn generalized_time(time: DateTime<Utc>) -> GeneralizedTime {
    GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(time.timestamp() as u64))
        .expect("time after 1970")
}
