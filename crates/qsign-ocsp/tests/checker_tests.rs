//! Revocation checks against a mock OCSP responder

use qsign_ocsp::{Error, OcspConfig, RevocationChecker, RevocationStatus};
use qsign_test_support::{
    leaf, root_ca, serve_trust_lists, system_trust_store, MockOcsp, MockTransport, OcspBehavior,
    TestCert, TestPki, Unreachable, Usage, DEFAULT_OCSP_URL,
};
use qsign_types::SystemClock;
use std::sync::Arc;

struct Fixture {
    pki: TestPki,
    transport: Arc<MockTransport>,
}

impl Fixture {
    fn new(behavior: OcspBehavior) -> Self {
        Self::with_responder(TestPki::new(), |pki| pki.ocsp_responder.clone(), behavior)
    }

    fn with_responder(
        pki: TestPki,
        responder: impl FnOnce(&TestPki) -> Arc<TestCert>,
        behavior: OcspBehavior,
    ) -> Self {
        let transport = Arc::new(MockTransport::new());
        serve_trust_lists(&transport, &pki);
        transport.route(
            DEFAULT_OCSP_URL,
            MockOcsp::new(responder(&pki)).with_behavior(behavior),
        );
        Self { pki, transport }
    }

    fn checker(&self, config: OcspConfig) -> RevocationChecker {
        RevocationChecker::with_parts(
            config,
            self.transport.clone(),
            system_trust_store(self.transport.clone()),
            Arc::new(SystemClock),
        )
    }

    fn try_check(&self) -> qsign_ocsp::Result<qsign_ocsp::RevocationEvidence> {
        self.checker(OcspConfig::default())
            .try_check(&self.pki.signer.der(), &self.pki.root.der())
    }
}

// ==== Status ====

#[test]
fn test_good_status_from_delegated_responder() {
    let fixture = Fixture::new(OcspBehavior::Good);

    let evidence = fixture.try_check().expect("revocation evidence");

    assert!(evidence.is_good());
    assert_eq!(evidence.nonce.len(), 16);
    assert_eq!(
        evidence.responder_certificate,
        fixture.pki.ocsp_responder.der()
    );
    assert!(evidence.next_update.is_some());
    assert!(evidence.this_update <= evidence.produced_at);

    let requests = fixture.transport.requests();
    let ocsp = requests
        .iter()
        .find(|r| r.url == DEFAULT_OCSP_URL)
        .expect("OCSP request sent");
    assert_eq!(
        ocsp.content_type.as_deref(),
        Some("application/ocsp-request")
    );
}

#[test]
fn test_issuer_signed_response() {
    let fixture = Fixture::with_responder(
        TestPki::new(),
        |pki| pki.root.clone(),
        OcspBehavior::Good,
    );

    let evidence = fixture.try_check().unwrap();
    assert!(evidence.is_good());
    assert_eq!(evidence.responder_certificate, fixture.pki.root.der());
}

#[test]
fn test_revoked_status() {
    let evidence = Fixture::new(OcspBehavior::Revoked).try_check().unwrap();

    match evidence.status {
        RevocationStatus::Revoked { reason, .. } => {
            assert_eq!(reason.as_deref(), Some("KeyCompromise"));
        }
        other => panic!("expected revoked, got {:?}", other),
    }
}

#[test]
fn test_unknown_status() {
    let evidence = Fixture::new(OcspBehavior::Unknown).try_check().unwrap();
    assert_eq!(evidence.status, RevocationStatus::Unknown);
}

// ==== Rejected responses ====

#[test]
fn test_missing_nonce_yields_no_evidence() {
    let fixture = Fixture::new(OcspBehavior::OmitNonce);

    assert!(matches!(fixture.try_check(), Err(Error::MissingNonce)));
    assert!(fixture
        .checker(OcspConfig::default())
        .check(&fixture.pki.signer.der(), &fixture.pki.root.der())
        .is_none());
}

#[test]
fn test_wrong_nonce_is_rejected() {
    assert!(matches!(
        Fixture::new(OcspBehavior::WrongNonce).try_check(),
        Err(Error::NonceMismatch { .. })
    ));
}

#[test]
fn test_expired_response_is_rejected() {
    assert!(matches!(
        Fixture::new(OcspBehavior::Expired).try_check(),
        Err(Error::Stale(_))
    ));
}

#[test]
fn test_corrupt_signature_is_rejected() {
    assert!(matches!(
        Fixture::new(OcspBehavior::CorruptSignature).try_check(),
        Err(Error::Signature(_))
    ));
}

#[test]
fn test_unsuccessful_status_is_rejected() {
    assert!(matches!(
        Fixture::new(OcspBehavior::TryLater).try_check(),
        Err(Error::UnsuccessfulStatus(_))
    ));
}

#[test]
fn test_foreign_responder_is_rejected() {
    let rogue_root = root_ca("Rogue Root");
    let rogue = Arc::new(leaf(&rogue_root, "Rogue OCSP", Usage::OcspSigning, None));
    let fixture = Fixture::with_responder(TestPki::new(), |_| rogue, OcspBehavior::Good);

    assert!(matches!(fixture.try_check(), Err(Error::TrustChain(_))));
}

#[test]
fn test_responder_without_ocsp_signing_usage_is_rejected() {
    let fixture = Fixture::with_responder(
        TestPki::new(),
        |pki| {
            Arc::new(leaf(
                &pki.root,
                "Not A Responder",
                Usage::DocumentSigning,
                None,
            ))
        },
        OcspBehavior::Good,
    );

    assert!(matches!(fixture.try_check(), Err(Error::TrustChain(_))));
}

// ==== Responder location ====

#[test]
fn test_certificate_without_responder_url() {
    let fixture = Fixture::new(OcspBehavior::Good);
    let no_aia = leaf(&fixture.pki.root, "No AIA", Usage::DocumentSigning, None);

    let result = fixture
        .checker(OcspConfig::default())
        .try_check(&no_aia.der(), &fixture.pki.root.der());
    assert!(matches!(result, Err(Error::NoResponderUrl)));
}

#[test]
fn test_responder_url_override() {
    let fixture = Fixture::new(OcspBehavior::Good);
    fixture.transport.route(
        "https://override.test/",
        MockOcsp::new(fixture.pki.ocsp_responder.clone()),
    );
    fixture.transport.route(DEFAULT_OCSP_URL, Unreachable);

    let evidence = fixture
        .checker(OcspConfig::default().with_responder_url("https://override.test/"))
        .try_check(&fixture.pki.signer.der(), &fixture.pki.root.der())
        .unwrap();

    assert!(evidence.is_good());
    assert_eq!(fixture.transport.count(DEFAULT_OCSP_URL), 0);
}

#[test]
fn test_plain_http_responder_requires_opt_in() {
    let url = "http://ocsp.test/";
    let fixture = Fixture::with_responder(
        TestPki::with_ocsp_url(url),
        |pki| pki.ocsp_responder.clone(),
        OcspBehavior::Good,
    );
    fixture
        .transport
        .route(url, MockOcsp::new(fixture.pki.ocsp_responder.clone()));
    let (cert, issuer) = (fixture.pki.signer.der(), fixture.pki.root.der());

    assert!(matches!(
        fixture.checker(OcspConfig::default()).try_check(&cert, &issuer),
        Err(Error::InsecureUrl(_))
    ));
    assert!(fixture
        .checker(OcspConfig::default().allow_insecure_http(true))
        .try_check(&cert, &issuer)
        .unwrap()
        .is_good());
}

#[test]
fn test_unreachable_responder_degrades_to_none() {
    let fixture = Fixture::new(OcspBehavior::Good);
    fixture.transport.route(DEFAULT_OCSP_URL, Unreachable);
    let checker = fixture.checker(OcspConfig::default());

    assert!(matches!(
        checker.try_check(&fixture.pki.signer.der(), &fixture.pki.root.der()),
        Err(Error::Transport(_))
    ));
    assert!(checker
        .check(&fixture.pki.signer.der(), &fixture.pki.root.der())
        .is_none());
}

// ==== Archived evidence ====

#[test]
fn test_stored_response_reverifies() {
    let fixture = Fixture::new(OcspBehavior::Revoked);
    let evidence = fixture.try_check().unwrap();

    let status = qsign_ocsp::verify_stored_response(
        &evidence.response,
        &fixture.pki.signer.parsed(),
        &fixture.pki.root.parsed(),
        &fixture.pki.anchors(),
    )
    .expect("stored evidence verifies");
    assert_eq!(status, evidence.status);
}

#[test]
fn test_stored_response_for_other_certificate() {
    let fixture = Fixture::new(OcspBehavior::Good);
    let evidence = fixture.try_check().unwrap();

    let result = qsign_ocsp::verify_stored_response(
        &evidence.response,
        &fixture.pki.tsa.parsed(),
        &fixture.pki.root.parsed(),
        &fixture.pki.anchors(),
    );
    assert!(matches!(result, Err(Error::CertIdMismatch)));
}
