//! Re-verification of stored packages and tamper detection

use qsign::{verify_package, ErrorKind, SignatureEngine, SignatureFormat, SigningIdentity};
use qsign_ocsp::{OcspConfig, RevocationChecker};
use qsign_test_support::{
    serve_trust_lists, system_trust_store, MockOcsp, MockTransport, MockTsa, TestPki,
    DEFAULT_OCSP_URL, TSA_URL,
};
use qsign_tsa::{TimestampClient, TimestampConfig};
use qsign_types::{SignaturePackage, SystemClock};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

const CONTENT: &[u8] = b"quarterly filing";

fn sign(pki: &TestPki, certificated: bool) -> SignaturePackage {
    let transport = Arc::new(MockTransport::new());
    serve_trust_lists(&transport, pki);
    transport.route(TSA_URL, MockTsa::new(pki.tsa.clone()));
    transport.route(DEFAULT_OCSP_URL, MockOcsp::new(pki.ocsp_responder.clone()));
    let trust = system_trust_store(transport.clone());

    let identity = if certificated {
        SigningIdentity::from_pem(
            pki.signer.key_pem().as_bytes(),
            pki.signer.pem().as_bytes(),
            Some(pki.root.pem().as_bytes()),
        )
        .expect("signer identity")
    } else {
        SigningIdentity::ephemeral().expect("ephemeral key")
    };
    let client = TimestampClient::with_transport(
        TimestampConfig::new(TSA_URL),
        transport.clone(),
        trust.clone(),
    )
    .expect("timestamp client");
    let checker = RevocationChecker::with_parts(
        OcspConfig::default(),
        transport,
        trust,
        Arc::new(SystemClock),
    );

    SignatureEngine::new(identity, client, Some(checker), Arc::new(SystemClock))
        .sign(CONTENT, &json!({"seq": 7}))
        .expect("signed package")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ==== Accepted packages ====

#[test]
fn test_verification_is_repeatable() {
    let pki = TestPki::new();
    let package = sign(&pki, true);
    let anchors = pki.anchors();

    let first = verify_package(&package, CONTENT, &json!({"seq": 7}), &anchors).unwrap();
    let second = verify_package(&package, CONTENT, &json!({"seq": 7}), &anchors).unwrap();

    assert_eq!(first.timestamp, second.timestamp);
    assert!(first.signature_verified);
    assert_eq!(first.format, SignatureFormat::BaselineLt);
}

// ==== Tampered packages ====

fn flip_signature(package: &mut SignaturePackage) {
    if let Some(byte) = package.signature.last_mut() {
        *byte ^= 0x01;
    }
}

fn shift_signing_time(package: &mut SignaturePackage) {
    package.signing_time -= chrono::Duration::seconds(1);
}

fn drop_revocation_evidence(package: &mut SignaturePackage) {
    package.ocsp_response = None;
}

fn downgrade_format(package: &mut SignaturePackage) {
    package.signature_format = SignatureFormat::BaselineT;
}

fn swap_certificate_id(package: &mut SignaturePackage) {
    package.certificate_id = format!("sha256:{}", "00".repeat(32));
}

fn flip_recorded_imprint(package: &mut SignaturePackage) {
    package.timestamp_message_imprint[0] ^= 0x01;
}

fn flip_token_imprint(package: &mut SignaturePackage) {
    let digest = package.timestamp_message_imprint.clone();
    let at = find(&package.timestamp_token, &digest).expect("imprint inside token");
    package.timestamp_token[at] ^= 0x01;
}

#[rstest]
#[case::signature(flip_signature as fn(&mut SignaturePackage))]
#[case::signing_time(shift_signing_time as fn(&mut SignaturePackage))]
#[case::missing_evidence(drop_revocation_evidence as fn(&mut SignaturePackage))]
#[case::format(downgrade_format as fn(&mut SignaturePackage))]
#[case::certificate_id(swap_certificate_id as fn(&mut SignaturePackage))]
#[case::recorded_imprint(flip_recorded_imprint as fn(&mut SignaturePackage))]
#[case::token_imprint(flip_token_imprint as fn(&mut SignaturePackage))]
fn test_tampered_package_is_rejected(#[case] tamper: fn(&mut SignaturePackage)) {
    let pki = TestPki::new();
    let mut package = sign(&pki, true);
    tamper(&mut package);

    let err = verify_package(&package, CONTENT, &json!({"seq": 7}), &pki.anchors()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation, "{}", err);
}

#[test]
fn test_other_content_is_rejected() {
    let pki = TestPki::new();
    let package = sign(&pki, false);

    let err =
        verify_package(&package, b"other filing", &json!({"seq": 7}), &pki.anchors()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(err.to_string().contains("content hash"));
}

#[test]
fn test_other_metadata_is_rejected() {
    let pki = TestPki::new();
    let package = sign(&pki, false);

    let err = verify_package(&package, CONTENT, &json!({"seq": 8}), &pki.anchors()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(err.to_string().contains("message imprint"));
}

#[test]
fn test_foreign_anchors_are_rejected() {
    let pki = TestPki::new();
    let package = sign(&pki, false);

    let err = verify_package(&package, CONTENT, &json!({"seq": 7}), &TestPki::new().anchors())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TrustChain);
}
