//! Signing key material
//!
//! A [`SigningIdentity`] is loaded once when the engine is built and never
//! changes afterwards.

use crate::error::{Error, Result};
use qsign_crypto::{
    certificate_fingerprint, load_certificate, parse_certificate, parse_certificate_info,
    subject_public_key_bytes, CertificateInfo, KeyPair, SigningScheme,
};
use qsign_types::Sha256Hash;
use std::path::Path;

/// The key the engine signs with, and the certificates vouching for it
#[derive(Debug)]
pub enum SigningIdentity {
    /// A key with its certificate and, optionally, the issuing CA certificate
    Certificated {
        /// Private key
        key: KeyPair,
        /// DER signing certificate
        certificate: Vec<u8>,
        /// DER issuer certificate, needed for revocation checks
        issuer: Option<Vec<u8>>,
    },
    /// A freshly generated key without certificate, for development only
    Ephemeral {
        /// Private key
        key: KeyPair,
    },
}

impl SigningIdentity {
    /// Build a certificated identity from in-memory key and certificate
    /// material (PEM or DER)
    ///
    /// The certificate must certify the public half of `key`.
    pub fn from_pem(key: &[u8], certificate: &[u8], issuer: Option<&[u8]>) -> Result<Self> {
        let key = KeyPair::from_bytes(key)
            .map_err(|e| Error::Configuration(format!("invalid private key: {}", e)))?;
        let certificate = load_certificate(certificate)
            .map_err(|e| Error::Configuration(format!("invalid signing certificate: {}", e)))?;
        let issuer = issuer
            .map(|bytes| {
                load_certificate(bytes).map_err(|e| {
                    Error::Configuration(format!("invalid issuer certificate: {}", e))
                })
            })
            .transpose()?;

        let parsed = parse_certificate(&certificate)
            .map_err(|e| Error::Configuration(format!("invalid signing certificate: {}", e)))?;
        if subject_public_key_bytes(&parsed) != key.public_key_bytes() {
            return Err(Error::Configuration(
                "signing certificate does not match the private key".to_string(),
            ));
        }

        Ok(SigningIdentity::Certificated {
            key,
            certificate,
            issuer,
        })
    }

    /// Read key, certificate and optional issuer certificate from files
    pub fn from_files(
        key: impl AsRef<Path>,
        certificate: impl AsRef<Path>,
        issuer: Option<&Path>,
    ) -> Result<Self> {
        let key_bytes = read(key.as_ref())?;
        let cert_bytes = read(certificate.as_ref())?;
        let issuer_bytes = issuer.map(read).transpose()?;
        Self::from_pem(&key_bytes, &cert_bytes, issuer_bytes.as_deref())
    }

    /// Generate a throwaway ECDSA P-256 identity
    pub fn ephemeral() -> Result<Self> {
        let key = KeyPair::generate_ecdsa_p256()
            .map_err(|e| Error::Configuration(format!("key generation failed: {}", e)))?;
        tracing::warn!("Using an ephemeral development key; signatures are not qualified");
        Ok(SigningIdentity::Ephemeral { key })
    }

    /// The private key
    pub fn key(&self) -> &KeyPair {
        match self {
            SigningIdentity::Certificated { key, .. } | SigningIdentity::Ephemeral { key } => key,
        }
    }

    /// DER signing certificate, if any
    pub fn certificate(&self) -> Option<&[u8]> {
        match self {
            SigningIdentity::Certificated { certificate, .. } => Some(certificate.as_slice()),
            SigningIdentity::Ephemeral { .. } => None,
        }
    }

    /// DER issuer certificate, if any
    pub fn issuer(&self) -> Option<&[u8]> {
        match self {
            SigningIdentity::Certificated { issuer, .. } => issuer.as_deref(),
            SigningIdentity::Ephemeral { .. } => None,
        }
    }

    /// Whether this is a development identity
    pub fn is_development(&self) -> bool {
        matches!(self, SigningIdentity::Ephemeral { .. })
    }

    /// Scheme used for signatures: RSA-PSS-SHA256 or ECDSA-P256-SHA256
    pub fn scheme(&self) -> SigningScheme {
        self.key().default_scheme()
    }

    /// Certificates embedded in packages: leaf first, then issuer
    pub fn certificate_chain(&self) -> Vec<Vec<u8>> {
        match self {
            SigningIdentity::Certificated {
                certificate,
                issuer,
                ..
            } => std::iter::once(certificate.clone())
                .chain(issuer.iter().cloned())
                .collect(),
            SigningIdentity::Ephemeral { .. } => Vec::new(),
        }
    }

    /// Identifier bound into every payload
    ///
    /// `sha256:<fingerprint>` for certificated identities,
    /// `ephemeral:<SHA-256 of the SPKI>` for development keys.
    pub fn certificate_id(&self) -> Result<String> {
        match self {
            SigningIdentity::Certificated { certificate, .. } => Ok(format!(
                "sha256:{}",
                certificate_fingerprint(certificate).to_hex()
            )),
            SigningIdentity::Ephemeral { key } => {
                let spki = key
                    .public_key_to_der()
                    .map_err(|e| Error::Configuration(format!("cannot encode public key: {}", e)))?;
                Ok(format!(
                    "ephemeral:{}",
                    Sha256Hash::from_bytes(qsign_crypto::sha256(&spki)).to_hex()
                ))
            }
        }
    }

    /// Diagnostic view of the signing certificate
    pub fn certificate_info(&self) -> Option<CertificateInfo> {
        let certificate = self.certificate()?;
        match parse_certificate_info(certificate) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Cannot describe signing certificate: {}", e);
                None
            }
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))
}
