//! OCSP request building and response verification

use crate::asn1::{
    find_nonce, to_datetime, BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse,
    OcspResponseStatus, SingleResponse,
};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use qsign_crypto::oids::ID_PKIX_OCSP_BASIC;
use qsign_crypto::{extract_ocsp_url, parse_certificate, resolve_scheme, VerificationKey};
use qsign_transport::{HttpTransport, ReqwestTransport};
use qsign_trust_list::{KeyPurpose, TrustAnchor, TrustAnchorSet, TrustListStore};
use qsign_types::{Clock, SystemClock};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use x509_cert::Certificate;

/// Content type of OCSP requests
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";

/// Length of the request nonce in bytes
pub const NONCE_LENGTH: usize = 16;

/// Configuration for a [`RevocationChecker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspConfig {
    /// Timeout for each request
    pub timeout: Duration,
    /// Tolerated clock difference for `thisUpdate`
    pub max_clock_skew: chrono::Duration,
    /// Accept `http` responder URLs
    pub allow_insecure_http: bool,
    /// Responder used instead of the certificate's AIA location
    pub responder_url: Option<String>,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_clock_skew: chrono::Duration::minutes(5),
            allow_insecure_http: false,
            responder_url: None,
        }
    }
}

impl OcspConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept plain `http` responder URLs
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    /// Always ask `url`
    pub fn with_responder_url(mut self, url: impl Into<String>) -> Self {
        self.responder_url = Some(url.into());
        self
    }
}

/// Certificate status reported by the responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Not revoked
    Good,
    /// Revoked at the given time
    Revoked {
        /// Revocation time
        revoked_at: DateTime<Utc>,
        /// CRL reason, if given
        reason: Option<String>,
    },
    /// Unknown to the responder
    Unknown,
}

/// Verified OCSP answer for one certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEvidence {
    /// Reported status
    pub status: RevocationStatus,
    /// Nonce sent and echoed
    pub nonce: Vec<u8>,
    /// DER certificate whose key signed the response
    pub responder_certificate: Vec<u8>,
    /// Raw DER OCSPResponse
    pub response: Vec<u8>,
    /// When the response was signed
    pub produced_at: DateTime<Utc>,
    /// When the status was known correct
    pub this_update: DateTime<Utc>,
    /// When newer information will be available
    pub next_update: Option<DateTime<Utc>>,
}

impl RevocationEvidence {
    /// Whether the responder reported the certificate as good
    pub fn is_good(&self) -> bool {
        self.status == RevocationStatus::Good
    }
}

/// An encoded OCSP request and what is needed to check its answer
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Responder URL
    pub url: String,
    /// CertID of the certificate asked about
    pub cert_id: CertId,
    /// Nonce carried by the request
    pub nonce: [u8; NONCE_LENGTH],
    /// DER encoded OCSPRequest
    pub der: Vec<u8>,
}

/// Build an OCSP request for `cert` issued by `issuer`
///
/// The responder URL comes from the certificate's Authority Information
/// Access extension unless `responder_url` overrides it.
pub fn build_request(
    cert: &Certificate,
    issuer: &Certificate,
    responder_url: Option<&str>,
) -> Result<PreparedRequest> {
    let url = match responder_url {
        Some(url) => url.to_string(),
        None => extract_ocsp_url(cert)
            .map_err(|e| Error::Certificate(e.to_string()))?
            .ok_or(Error::NoResponderUrl)?,
    };

    let cert_id = CertId::sha1(cert, issuer)
        .map_err(|e| Error::Asn1(format!("failed to build CertID: {}", e)))?;
    let nonce: [u8; NONCE_LENGTH] = rand::rng().random();
    let der = OcspRequest::new(cert_id.clone(), &nonce)
        .and_then(|request| request.to_der())
        .map_err(|e| Error::Asn1(format!("failed to encode request: {}", e)))?;

    Ok(PreparedRequest {
        url,
        cert_id,
        nonce,
        der,
    })
}

/// Best-effort OCSP revocation checker
#[derive(Debug, Clone)]
pub struct RevocationChecker {
    config: OcspConfig,
    transport: Arc<dyn HttpTransport>,
    trust: Arc<TrustListStore>,
    clock: Arc<dyn Clock>,
}

impl RevocationChecker {
    /// Create a checker using a reqwest transport and the system clock
    pub fn new(config: OcspConfig, trust: Arc<TrustListStore>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_parts(config, transport, trust, Arc::new(SystemClock)))
    }

    /// Create a checker from explicit collaborators
    pub fn with_parts(
        config: OcspConfig,
        transport: Arc<dyn HttpTransport>,
        trust: Arc<TrustListStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            trust,
            clock,
        }
    }

    /// Check `cert_der` issued by `issuer_der`, degrading every failure to
    /// `None`
    pub fn check(&self, cert_der: &[u8], issuer_der: &[u8]) -> Option<RevocationEvidence> {
        match self.try_check(cert_der, issuer_der) {
            Ok(evidence) => {
                tracing::debug!("OCSP status: {:?}", evidence.status);
                Some(evidence)
            }
            Err(e) => {
                tracing::warn!("No revocation evidence: {}", e);
                None
            }
        }
    }

    /// Check `cert_der` issued by `issuer_der`, reporting why no evidence
    /// could be produced
    pub fn try_check(&self, cert_der: &[u8], issuer_der: &[u8]) -> Result<RevocationEvidence> {
        let cert = parse_certificate(cert_der).map_err(|e| Error::Certificate(e.to_string()))?;
        let issuer =
            parse_certificate(issuer_der).map_err(|e| Error::Certificate(e.to_string()))?;

        let request = build_request(&cert, &issuer, self.config.responder_url.as_deref())?;
        self.check_url(&request.url)?;

        tracing::debug!("Requesting OCSP status from {}", request.url);
        let body = self
            .transport
            .post(
                &request.url,
                OCSP_REQUEST_CONTENT_TYPE,
                request.der.clone(),
                self.config.timeout,
            )?
            .into_success_body(&request.url)?;

        let anchors = self.trust.load()?;
        verify_response(
            &body,
            &request,
            &issuer,
            &anchors,
            self.clock.now(),
            self.config.max_clock_skew,
        )
    }

    fn check_url(&self, raw: &str) -> Result<()> {
        let url = url::Url::parse(raw).map_err(|_| Error::InsecureUrl(raw.to_string()))?;
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_insecure_http => Ok(()),
            _ => Err(Error::InsecureUrl(raw.to_string())),
        }
    }
}

/// Verify a DER OCSPResponse answering `request`
///
/// `now` and `skew` bound the response's validity window.
pub fn verify_response(
    body: &[u8],
    request: &PreparedRequest,
    issuer: &Certificate,
    anchors: &TrustAnchorSet,
    now: DateTime<Utc>,
    skew: chrono::Duration,
) -> Result<RevocationEvidence> {
    let basic = decode_basic(body)?;
    let data = &basic.tbs_response_data;

    let produced_at = to_datetime(&data.produced_at)
        .ok_or_else(|| Error::Asn1("invalid producedAt".to_string()))?;

    let responder = find_responder(&basic, issuer)?;
    authorize_responder(&responder, &basic, issuer, anchors, produced_at)?;
    verify_signature(&basic, &responder)?;

    let echoed = find_nonce(data.response_extensions.as_ref()).ok_or(Error::MissingNonce)?;
    if echoed != request.nonce {
        tracing::error!("OCSP nonce does not match the request");
        return Err(Error::NonceMismatch {
            expected: hex::encode(request.nonce),
            actual: hex::encode(&echoed),
        });
    }

    let single = data
        .responses
        .iter()
        .find(|single| single.cert_id.matches(&request.cert_id))
        .ok_or(Error::CertIdMismatch)?;
    let (this_update, next_update) = check_validity_window(single, now, skew)?;

    let responder_certificate = responder
        .to_der()
        .map_err(|e| Error::Asn1(format!("failed to encode responder certificate: {}", e)))?;

    Ok(RevocationEvidence {
        status: status_of(single)?,
        nonce: echoed,
        responder_certificate,
        response: body.to_vec(),
        produced_at,
        this_update,
        next_update,
    })
}

/// Verify archived OCSP evidence for `cert`
///
/// The request nonce is no longer known, so this checks the responder's
/// authority as of `producedAt`, the signature and the CertID, and returns
/// the reported status.
pub fn verify_stored_response(
    body: &[u8],
    cert: &Certificate,
    issuer: &Certificate,
    anchors: &TrustAnchorSet,
) -> Result<RevocationStatus> {
    let basic = decode_basic(body)?;
    let data = &basic.tbs_response_data;
    let produced_at = to_datetime(&data.produced_at)
        .ok_or_else(|| Error::Asn1("invalid producedAt".to_string()))?;

    let responder = find_responder(&basic, issuer)?;
    authorize_responder(&responder, &basic, issuer, anchors, produced_at)?;
    verify_signature(&basic, &responder)?;

    let cert_id = CertId::sha1(cert, issuer)
        .map_err(|e| Error::Asn1(format!("failed to build CertID: {}", e)))?;
    let single = data
        .responses
        .iter()
        .find(|single| single.cert_id.matches(&cert_id))
        .ok_or(Error::CertIdMismatch)?;
    status_of(single)
}

/// Decode an OCSPResponse down to its successful basic response
fn decode_basic(body: &[u8]) -> Result<BasicOcspResponse> {
    let response = OcspResponse::from_der(body)
        .map_err(|e| Error::Asn1(format!("failed to decode OCSPResponse: {}", e)))?;
    if response.response_status != OcspResponseStatus::Successful {
        return Err(Error::UnsuccessfulStatus(format!(
            "{:?}",
            response.response_status
        )));
    }

    let bytes = response
        .response_bytes
        .ok_or_else(|| Error::Asn1("successful response without responseBytes".to_string()))?;
    if bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(Error::UnsupportedResponseType(bytes.response_type.to_string()));
    }
    BasicOcspResponse::from_der(bytes.response.as_bytes())
        .map_err(|e| Error::Asn1(format!("failed to decode BasicOCSPResponse: {}", e)))
}

/// Locate the certificate named by the ResponderID
fn find_responder(basic: &BasicOcspResponse, issuer: &Certificate) -> Result<Certificate> {
    let responder_id = &basic.tbs_response_data.responder_id;
    if responder_id.matches(issuer) {
        return Ok(issuer.clone());
    }
    basic
        .certs
        .iter()
        .flatten()
        .find(|cert| responder_id.matches(cert))
        .cloned()
        .ok_or_else(|| Error::TrustChain("responder certificate not included".to_string()))
}

/// Accept the issuer itself, a delegate issued by the issuer, or a responder
/// chaining to a trust anchor
fn authorize_responder(
    responder: &Certificate,
    basic: &BasicOcspResponse,
    issuer: &Certificate,
    anchors: &TrustAnchorSet,
    at: DateTime<Utc>,
) -> Result<()> {
    if responder == issuer {
        tracing::debug!("OCSP response signed by the issuer");
        return Ok(());
    }

    let encode = |cert: &Certificate| {
        cert.to_der()
            .map_err(|e| Error::Asn1(format!("failed to encode certificate: {}", e)))
    };
    let responder_der = encode(responder)?;
    let issuer_der = encode(issuer)?;

    let delegating = TrustAnchorSet::from(vec![TrustAnchor::new(
        "issuer",
        issuer_der.clone(),
        "ocsp:issuer",
    )]);
    if delegating
        .verify_chain(&responder_der, &[], at, KeyPurpose::OcspSigning)
        .is_ok()
    {
        tracing::debug!("OCSP response signed by a responder delegated by the issuer");
        return Ok(());
    }

    let mut intermediates = vec![issuer_der];
    for cert in basic.certs.iter().flatten() {
        intermediates.push(encode(cert)?);
    }
    anchors
        .verify_chain(&responder_der, &intermediates, at, KeyPurpose::OcspSigning)
        .map_err(|e| Error::TrustChain(e.to_string()))
}

fn verify_signature(basic: &BasicOcspResponse, responder: &Certificate) -> Result<()> {
    let spki = &responder.tbs_certificate.subject_public_key_info;
    let scheme = resolve_scheme(&basic.signature_algorithm, None, spki)
        .map_err(|e| Error::Signature(e.to_string()))?;
    let tbs = basic
        .tbs_response_data
        .to_der()
        .map_err(|e| Error::Asn1(format!("failed to encode ResponseData: {}", e)))?;

    VerificationKey::from_spki(spki, scheme)
        .verify(&tbs, basic.signature.raw_bytes())
        .map_err(|e| Error::Signature(e.to_string()))
}

fn check_validity_window(
    single: &SingleResponse,
    now: DateTime<Utc>,
    skew: chrono::Duration,
) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    let this_update = to_datetime(&single.this_update)
        .ok_or_else(|| Error::Asn1("invalid thisUpdate".to_string()))?;
    if this_update > now + skew {
        return Err(Error::Stale(format!("thisUpdate {} is in the future", this_update)));
    }

    let next_update = match &single.next_update {
        Some(time) => {
            let next = to_datetime(time)
                .ok_or_else(|| Error::Asn1("invalid nextUpdate".to_string()))?;
            if next < now {
                return Err(Error::Stale(format!("nextUpdate {} has passed", next)));
            }
            Some(next)
        }
        None => None,
    };
    Ok((this_update, next_update))
}

fn status_of(single: &SingleResponse) -> Result<RevocationStatus> {
    Ok(match &single.cert_status {
        CertStatus::Good(_) => RevocationStatus::Good,
        CertStatus::Unknown(_) => RevocationStatus::Unknown,
        CertStatus::Revoked(info) => RevocationStatus::Revoked {
            revoked_at: to_datetime(&info.revocation_time)
                .ok_or_else(|| Error::Asn1("invalid revocationTime".to_string()))?,
            reason: info.revocation_reason.map(|reason| format!("{:?}", reason)),
        },
    })
}
