//! X.509 certificate utilities
//!
//! This module provides utilities for parsing and extracting information
//! from signer, timestamp-authority and OCSP-responder certificates.

use crate::error::{Error, Result};
use crate::hash::sha256;
use crate::oids::{ID_AD_OCSP, ID_ETSI_QCS_QC_COMPLIANCE, ID_PE_QC_STATEMENTS};
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::{Any, Decode, Encode, Sequence};
use qsign_types::Sha256Hash;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::time::Time;
use x509_cert::Certificate;

/// QCStatement (ETSI EN 319 412-5)
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct QcStatement {
    statement_id: ObjectIdentifier,
    statement_info: Option<Any>,
}

/// Information extracted from a certificate, for diagnostics
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number, lowercase hex
    pub serial_number: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Whether the certificate declares EU qualified status (QcCompliance)
    pub qualified: bool,
    /// OCSP responder URL from Authority Information Access
    pub ocsp_url: Option<String>,
    /// SHA-256 over the DER encoding
    pub fingerprint: Sha256Hash,
    /// Public key in DER-encoded SPKI format
    pub public_key: Vec<u8>,
}

impl CertificateInfo {
    /// Whether `at` falls inside the validity window
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

fn to_datetime(time: &Time) -> DateTime<Utc> {
    let secs = time.to_unix_duration().as_secs() as i64;
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Parse a DER certificate
pub fn parse_certificate(cert_der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(cert_der)
        .map_err(|e| Error::InvalidCertificate(format!("failed to parse certificate: {}", e)))
}

/// Parse certificate information from DER-encoded certificate
pub fn parse_certificate_info(cert_der: &[u8]) -> Result<CertificateInfo> {
    let cert = parse_certificate(cert_der)?;
    let tbs = &cert.tbs_certificate;

    let public_key = tbs
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::InvalidCertificate(format!("failed to encode SPKI: {}", e)))?;

    Ok(CertificateInfo {
        subject: tbs.subject.to_string(),
        issuer: tbs.issuer.to_string(),
        serial_number: hex::encode(tbs.serial_number.as_bytes()),
        not_before: to_datetime(&tbs.validity.not_before),
        not_after: to_datetime(&tbs.validity.not_after),
        qualified: is_qualified(&cert)?,
        ocsp_url: extract_ocsp_url(&cert)?,
        fingerprint: certificate_fingerprint(cert_der),
        public_key,
    })
}

/// Load a certificate from PEM or DER bytes, returning DER
pub fn load_certificate(bytes: &[u8]) -> Result<Vec<u8>> {
    let der = match std::str::from_utf8(bytes) {
        Ok(text) if text.contains("-----BEGIN") => {
            let parsed = pem::parse(text).map_err(|e| Error::Pem(e.to_string()))?;
            if parsed.tag() != "CERTIFICATE" {
                return Err(Error::InvalidCertificate(format!(
                    "expected CERTIFICATE PEM block, got {}",
                    parsed.tag()
                )));
            }
            parsed.into_contents()
        }
        _ => bytes.to_vec(),
    };

    parse_certificate(&der)?;
    Ok(der)
}

/// SHA-256 fingerprint of a DER certificate
pub fn certificate_fingerprint(cert_der: &[u8]) -> Sha256Hash {
    Sha256Hash::from_bytes(sha256(cert_der))
}

/// Raw subject public key bytes (the BIT STRING contents of the SPKI)
pub fn subject_public_key_bytes(cert: &Certificate) -> &[u8] {
    cert.tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes()
}

/// Whether the certificate carries the ETSI QcCompliance statement
pub fn is_qualified(cert: &Certificate) -> Result<bool> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(false);
    };

    for ext in extensions.iter().filter(|e| e.extn_id == ID_PE_QC_STATEMENTS) {
        let statements = Vec::<QcStatement>::from_der(ext.extn_value.as_bytes()).map_err(|e| {
            Error::InvalidCertificate(format!("failed to parse QCStatements: {}", e))
        })?;
        if statements
            .iter()
            .any(|s| s.statement_id == ID_ETSI_QCS_QC_COMPLIANCE)
        {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Extract the OCSP responder URL from the Authority Information Access extension
pub fn extract_ocsp_url(cert: &Certificate) -> Result<Option<String>> {
    let aia: Option<(bool, AuthorityInfoAccessSyntax)> = cert
        .tbs_certificate
        .get()
        .map_err(|e| Error::InvalidCertificate(format!("failed to get AIA extension: {}", e)))?;

    let Some((_critical, aia)) = aia else {
        return Ok(None);
    };

    Ok(aia.0.iter().find_map(|desc| {
        if desc.access_method != ID_AD_OCSP {
            return None;
        }
        match &desc.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, CustomExtension, KeyPair};

    fn self_signed(params: CertificateParams) -> Vec<u8> {
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn aia_extension(url: &str) -> CustomExtension {
        use x509_cert::der::asn1::Ia5String;
        use x509_cert::ext::pkix::AccessDescription;

        let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
            access_method: ID_AD_OCSP,
            access_location: GeneralName::UniformResourceIdentifier(
                Ia5String::new(url).unwrap(),
            ),
        }]);
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], aia.to_der().unwrap())
    }

    fn qc_extension() -> CustomExtension {
        let statements = vec![QcStatement {
            statement_id: ID_ETSI_QCS_QC_COMPLIANCE,
            statement_info: None,
        }];
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 3], statements.to_der().unwrap())
    }

    #[test]
    fn test_parse_plain_certificate() {
        let der = self_signed(CertificateParams::new(vec!["signer.example".to_string()]).unwrap());
        let info = parse_certificate_info(&der).unwrap();

        assert!(!info.qualified);
        assert!(info.ocsp_url.is_none());
        assert!(info.not_before < info.not_after);
        assert!(info.is_valid_at(Utc::now()));
        assert_eq!(info.fingerprint, certificate_fingerprint(&der));
    }

    #[test]
    fn test_extracts_ocsp_url_and_qc_statement() {
        let mut params = CertificateParams::new(vec!["signer.example".to_string()]).unwrap();
        params.custom_extensions = vec![aia_extension("http://ocsp.example/"), qc_extension()];
        let der = self_signed(params);

        let info = parse_certificate_info(&der).unwrap();
        assert_eq!(info.ocsp_url.as_deref(), Some("http://ocsp.example/"));
        assert!(info.qualified);
    }

    #[test]
    fn test_load_certificate_pem_and_der() {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["a.example".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let from_pem = load_certificate(cert.pem().as_bytes()).unwrap();
        let from_der = load_certificate(cert.der()).unwrap();
        assert_eq!(from_pem, from_der);
        assert!(load_certificate(b"not a certificate").is_err());
    }

    #[test]
    fn test_subject_public_key_bytes() {
        let key = KeyPair::generate().unwrap();
        let der = CertificateParams::new(vec!["a.example".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap()
            .der()
            .to_vec();
        let cert = parse_certificate(&der).unwrap();
        assert_eq!(subject_public_key_bytes(&cert), key.public_key_raw());
    }
}
