//! A throwaway PKI generated with rcgen

use aws_lc_rs::encoding::{AsDer, Pkcs8V1Der};
use qsign_trust_list::{TrustAnchor, TrustAnchorSet};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use std::sync::Arc;

/// Responder location placed in the signer certificate's AIA extension
pub const DEFAULT_OCSP_URL: &str = "https://ocsp.test/";

/// What a leaf certificate is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Time-stamping authority, `id-kp-timeStamping`
    TimeStamping,
    /// Delegated OCSP responder, `id-kp-OCSPSigning`
    OcspSigning,
    /// Document signer, `id-kp-emailProtection`
    DocumentSigning,
}

/// A certificate together with its private key
pub struct TestCert {
    name: String,
    certificate: rcgen::Certificate,
    key: KeyPair,
}

impl std::fmt::Debug for TestCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCert").field("name", &self.name).finish()
    }
}

impl TestCert {
    /// Common name of the subject
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DER certificate
    pub fn der(&self) -> Vec<u8> {
        self.certificate.der().to_vec()
    }

    /// PEM certificate
    pub fn pem(&self) -> String {
        self.certificate.pem()
    }

    /// PKCS#8 PEM private key
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    /// The private key as a qsign signing key
    pub fn signing_key(&self) -> qsign_crypto::KeyPair {
        qsign_crypto::KeyPair::from_pkcs8_der(&self.key.serialize_der())
            .expect("rcgen keys are PKCS#8")
    }

    /// Decoded certificate
    pub fn parsed(&self) -> x509_cert::Certificate {
        qsign_crypto::parse_certificate(&self.der()).expect("rcgen certificates decode")
    }

    /// A trust anchor for this certificate
    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor::new(self.name.clone(), self.der(), "test")
    }
}

fn base_params(name: &str) -> CertificateParams {
    let mut params =
        CertificateParams::new(Vec::<String>::new()).expect("empty SAN list is valid");
    params.distinguished_name.push(DnType::CommonName, name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "qsign tests");
    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2099, 12, 31);
    params
}

/// DER AuthorityInfoAccessSyntax with a single `id-ad-ocsp` URI
pub fn aia_extension(ocsp_url: &str) -> CustomExtension {
    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = content.len();
        if len < 0x80 {
            out.push(len as u8);
        } else {
            out.push(0x82);
            out.push((len >> 8) as u8);
            out.push(len as u8);
        }
        out.extend_from_slice(content);
        out
    }

    let mut description = tlv(0x06, &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01]);
    description.extend(tlv(0x86, ocsp_url.as_bytes()));
    let syntax = tlv(0x30, &tlv(0x30, &description));

    CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], syntax)
}

/// Create a self-signed root CA
pub fn root_ca(name: &str) -> TestCert {
    let key = KeyPair::generate().expect("key generation");
    let mut params = base_params(name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let certificate = params.self_signed(&key).expect("self-signed root");

    TestCert {
        name: name.to_string(),
        certificate,
        key,
    }
}

/// A fresh RSA-2048 key usable by rcgen
fn rsa_key() -> KeyPair {
    let key = aws_lc_rs::rsa::KeyPair::generate(aws_lc_rs::rsa::KeySize::Rsa2048)
        .expect("RSA key generation");
    let pkcs8: Pkcs8V1Der<'static> = key.as_der().expect("PKCS#8 encoding");
    let pem = pem::encode(&pem::Pem::new("PRIVATE KEY", pkcs8.as_ref().to_vec()));
    KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256).expect("rcgen RSA key")
}

/// Issue a leaf certificate with a P-256 key from `issuer`
///
/// `ocsp_url` adds an Authority Information Access extension.
pub fn leaf(issuer: &TestCert, name: &str, usage: Usage, ocsp_url: Option<&str>) -> TestCert {
    let key = KeyPair::generate().expect("key generation");
    issue(issuer, name, usage, ocsp_url, key)
}

/// Issue a leaf certificate with an RSA-2048 key from `issuer`
pub fn rsa_leaf(issuer: &TestCert, name: &str, usage: Usage, ocsp_url: Option<&str>) -> TestCert {
    issue(issuer, name, usage, ocsp_url, rsa_key())
}

fn issue(
    issuer: &TestCert,
    name: &str,
    usage: Usage,
    ocsp_url: Option<&str>,
    key: KeyPair,
) -> TestCert {
    let mut params = base_params(name);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![match usage {
        Usage::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
        Usage::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
        Usage::DocumentSigning => ExtendedKeyUsagePurpose::EmailProtection,
    }];
    if usage == Usage::DocumentSigning {
        params.key_usages.push(KeyUsagePurpose::ContentCommitment);
    }
    if let Some(url) = ocsp_url {
        params.custom_extensions.push(aia_extension(url));
    }
    let certificate = params
        .signed_by(&key, &issuer.certificate, &issuer.key)
        .expect("leaf issuance");

    TestCert {
        name: name.to_string(),
        certificate,
        key,
    }
}

/// Root CA with a time-stamping authority, an OCSP responder and a signer
#[derive(Debug, Clone)]
pub struct TestPki {
    /// Trust anchor
    pub root: Arc<TestCert>,
    /// TSA certificate issued by the root
    pub tsa: Arc<TestCert>,
    /// Delegated OCSP responder issued by the root
    pub ocsp_responder: Arc<TestCert>,
    /// Document signer issued by the root, pointing at [`DEFAULT_OCSP_URL`]
    pub signer: Arc<TestCert>,
}

impl TestPki {
    /// Generate a fresh hierarchy
    pub fn new() -> Self {
        Self::with_ocsp_url(DEFAULT_OCSP_URL)
    }

    /// Generate a fresh hierarchy whose signer points at `ocsp_url`
    pub fn with_ocsp_url(ocsp_url: &str) -> Self {
        let root = root_ca("qsign Test Root");
        let tsa = leaf(&root, "qsign Test TSA", Usage::TimeStamping, None);
        let ocsp_responder = leaf(&root, "qsign Test OCSP", Usage::OcspSigning, None);
        let signer = leaf(&root, "qsign Test Signer", Usage::DocumentSigning, Some(ocsp_url));

        Self {
            root: Arc::new(root),
            tsa: Arc::new(tsa),
            ocsp_responder: Arc::new(ocsp_responder),
            signer: Arc::new(signer),
        }
    }

    /// An anchor set holding only the root
    pub fn anchors(&self) -> TrustAnchorSet {
        TrustAnchorSet::from(vec![self.root.anchor()])
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}
