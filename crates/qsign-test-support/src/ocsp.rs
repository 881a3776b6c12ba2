//! A signing OCSP responder

use crate::pki::TestCert;
use crate::transport::{Endpoint, RecordedRequest};
use crate::tsa::generalized_time;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, Null, OctetString};
use der::{Decode, Encode};
use qsign_ocsp::asn1::{
    nonce_extension, BasicOcspResponse, CertStatus, CrlReason, OcspRequest, OcspResponse,
    OcspResponseStatus, ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
};
use qsign_transport::{HttpResponse, Result};
use spki::AlgorithmIdentifierOwned;
use std::sync::{Arc, Mutex, PoisonError};

const ECDSA_WITH_SHA_256: ObjectIdentifier = const_oid::db::rfc5912::ECDSA_WITH_SHA_256;

/// How the responder answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspBehavior {
    /// `good`
    Good,
    /// `revoked` with reason keyCompromise
    Revoked,
    /// `unknown`
    Unknown,
    /// `good`, without the nonce extension
    OmitNonce,
    /// `good`, echoing another nonce
    WrongNonce,
    /// `good`, with nextUpdate in the past
    Expired,
    /// `good`, with one signature byte flipped
    CorruptSignature,
    /// `tryLater` status
    TryLater,
}

/// Mock OCSP responder signing with a [`TestCert`]
///
/// Use the issuing CA as signer for issuer-signed responses, or a certificate
/// with the OCSP signing EKU for delegated ones.
#[derive(Debug)]
pub struct MockOcsp {
    signer: Arc<TestCert>,
    behavior: Mutex<OcspBehavior>,
    time: Mutex<Option<DateTime<Utc>>>,
}

impl MockOcsp {
    /// A responder answering `good`
    pub fn new(signer: Arc<TestCert>) -> Self {
        Self {
            signer,
            behavior: Mutex::new(OcspBehavior::Good),
            time: Mutex::new(None),
        }
    }

    /// Answer with `behavior`, builder style
    pub fn with_behavior(self, behavior: OcspBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Produce responses as of `time` instead of the current time
    pub fn at(self, time: DateTime<Utc>) -> Self {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) = Some(time);
        self
    }

    /// Change the behavior of later requests
    pub fn set_behavior(&self, behavior: OcspBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    fn behavior(&self) -> OcspBehavior {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_else(|| Utc::now().trunc_subsecs(0))
    }

    /// Build the DER `OCSPResponse` answering `request`
    pub fn respond(&self, request: &OcspRequest) -> Vec<u8> {
        let behavior = self.behavior();
        if behavior == OcspBehavior::TryLater {
            return OcspResponse {
                response_status: OcspResponseStatus::TryLater,
                response_bytes: None,
            }
            .to_der()
            .expect("encode tryLater");
        }

        let now = self.now();
        let cert_status = match behavior {
            OcspBehavior::Revoked => CertStatus::Revoked(RevokedInfo {
                revocation_time: generalized_time(now - Duration::days(1)),
                revocation_reason: Some(CrlReason::KeyCompromise),
            }),
            OcspBehavior::Unknown => CertStatus::Unknown(Null),
            _ => CertStatus::Good(Null),
        };
        let next_update = match behavior {
            OcspBehavior::Expired => now - Duration::minutes(1),
            _ => now + Duration::hours(1),
        };

        let responses = request
            .tbs_request
            .request_list
            .iter()
            .map(|single| SingleResponse {
                cert_id: single.req_cert.clone(),
                cert_status: cert_status.clone(),
                this_update: generalized_time(now - Duration::hours(1)),
                next_update: Some(generalized_time(next_update)),
                single_extensions: None,
            })
            .collect();

        let nonce = match behavior {
            OcspBehavior::OmitNonce => None,
            OcspBehavior::WrongNonce => Some(vec![0x5a; 16]),
            _ => request.nonce(),
        };

        let certificate = self.signer.parsed();
        let key_hash = qsign_crypto::sha1(qsign_crypto::subject_public_key_bytes(&certificate));
        let tbs_response_data = ResponseData {
            version: 0,
            responder_id: ResponderId::ByKey(
                OctetString::new(key_hash.to_vec()).expect("key hash"),
            ),
            produced_at: generalized_time(now),
            responses,
            response_extensions: nonce
                .map(|nonce| vec![nonce_extension(&nonce).expect("nonce extension")]),
        };

        let mut signature = self
            .signer
            .signing_key()
            .sign(&tbs_response_data.to_der().expect("encode ResponseData"))
            .expect("sign")
            .into_bytes();
        if behavior == OcspBehavior::CorruptSignature {
            if let Some(last) = signature.last_mut() {
                *last ^= 0x01;
            }
        }

        let basic = BasicOcspResponse {
            tbs_response_data,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA_256,
                parameters: None,
            },
            signature: BitString::from_bytes(&signature).expect("signature"),
            certs: Some(vec![certificate]),
        };

        OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: qsign_crypto::oids::ID_PKIX_OCSP_BASIC,
                response: OctetString::new(basic.to_der().expect("encode basic response"))
                    .expect("response bytes"),
            }),
        }
        .to_der()
        .expect("encode response")
    }
}

impl Endpoint for MockOcsp {
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse> {
        match OcspRequest::from_der(&request.body) {
            Ok(req) => Ok(HttpResponse::ok(
                "application/ocsp-response",
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
