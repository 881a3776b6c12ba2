//! Key loading and signing using aws-lc-rs

use crate::error::{Error, Result};
use crate::oids::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1};
use aws_lc_rs::{
    rand::SystemRandom,
    signature::{
        EcdsaKeyPair, KeyPair as AwsKeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
        RSA_PKCS1_SHA256, RSA_PKCS1_SHA384, RSA_PKCS1_SHA512, RSA_PSS_SHA256, RSA_PSS_SHA384,
        RSA_PSS_SHA512,
    },
};
use der::asn1::BitString;
use der::Encode;
use qsign_types::HashAlgorithm;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::str::FromStr;

/// A cryptographic signature
///
/// This type wraps raw signature bytes. It can be created by signing
/// data with a `KeyPair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create a new Signature from raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the inner bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Get the length of the signature in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the signature is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Supported signature schemes
///
/// Resolved once, either from the key type when signing or from the
/// algorithm identifiers of a structure being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningScheme {
    /// ECDSA P-256 with SHA-256
    EcdsaP256Sha256,
    /// ECDSA P-256 with SHA-384
    EcdsaP256Sha384,
    /// ECDSA P-384 with SHA-256
    EcdsaP384Sha256,
    /// ECDSA P-384 with SHA-384
    EcdsaP384Sha384,
    /// RSA PSS with SHA-256
    RsaPssSha256,
    /// RSA PSS with SHA-384
    RsaPssSha384,
    /// RSA PSS with SHA-512
    RsaPssSha512,
    /// RSA PKCS#1 v1.5 with SHA-256
    RsaPkcs1Sha256,
    /// RSA PKCS#1 v1.5 with SHA-384
    RsaPkcs1Sha384,
    /// RSA PKCS#1 v1.5 with SHA-512
    RsaPkcs1Sha512,
}

impl SigningScheme {
    /// Get the name of this scheme
    pub fn name(&self) -> &'static str {
        match self {
            SigningScheme::EcdsaP256Sha256 => "ECDSA_P256_SHA256",
            SigningScheme::EcdsaP256Sha384 => "ECDSA_P256_SHA384",
            SigningScheme::EcdsaP384Sha256 => "ECDSA_P384_SHA256",
            SigningScheme::EcdsaP384Sha384 => "ECDSA_P384_SHA384",
            SigningScheme::RsaPssSha256 => "RSA_PSS_SHA256",
            SigningScheme::RsaPssSha384 => "RSA_PSS_SHA384",
            SigningScheme::RsaPssSha512 => "RSA_PSS_SHA512",
            SigningScheme::RsaPkcs1Sha256 => "RSA_PKCS1_SHA256",
            SigningScheme::RsaPkcs1Sha384 => "RSA_PKCS1_SHA384",
            SigningScheme::RsaPkcs1Sha512 => "RSA_PKCS1_SHA512",
        }
    }

    /// Digest algorithm applied to the message before signing
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            SigningScheme::EcdsaP256Sha256
            | SigningScheme::EcdsaP384Sha256
            | SigningScheme::RsaPssSha256
            | SigningScheme::RsaPkcs1Sha256 => HashAlgorithm::Sha256,
            SigningScheme::EcdsaP256Sha384
            | SigningScheme::EcdsaP384Sha384
            | SigningScheme::RsaPssSha384
            | SigningScheme::RsaPkcs1Sha384 => HashAlgorithm::Sha384,
            SigningScheme::RsaPssSha512 | SigningScheme::RsaPkcs1Sha512 => HashAlgorithm::Sha512,
        }
    }

    /// Whether the scheme resists a cryptographically relevant quantum computer
    pub fn is_quantum_resistant(&self) -> bool {
        false
    }
}

impl std::fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SigningScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            SigningScheme::EcdsaP256Sha256,
            SigningScheme::EcdsaP256Sha384,
            SigningScheme::EcdsaP384Sha256,
            SigningScheme::EcdsaP384Sha384,
            SigningScheme::RsaPssSha256,
            SigningScheme::RsaPssSha384,
            SigningScheme::RsaPssSha512,
            SigningScheme::RsaPkcs1Sha256,
            SigningScheme::RsaPkcs1Sha384,
            SigningScheme::RsaPkcs1Sha512,
        ]
        .into_iter()
        .find(|scheme| scheme.name() == s)
        .ok_or_else(|| Error::UnsupportedAlgorithm(s.to_string()))
    }
}

/// A private key for signing
pub enum KeyPair {
    /// ECDSA P-256 key pair
    EcdsaP256(EcdsaKeyPair),
    /// RSA key pair
    Rsa(RsaKeyPair),
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPair::EcdsaP256(_) => f.write_str("KeyPair::EcdsaP256(..)"),
            KeyPair::Rsa(kp) => write!(f, "KeyPair::Rsa({} bits)", kp.public_modulus_len() * 8),
        }
    }
}

impl KeyPair {
    /// Generate a new ECDSA P-256 key pair
    pub fn generate_ecdsa_p256() -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| Error::KeyGeneration("failed to generate ECDSA P-256 key".to_string()))?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref())?;
        Ok(KeyPair::EcdsaP256(key_pair))
    }

    /// Load a private key from PEM
    ///
    /// Accepts PKCS#8 (`PRIVATE KEY`), PKCS#1 (`RSA PRIVATE KEY`) and
    /// SEC1 (`EC PRIVATE KEY`) blocks.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let parsed = pem::parse(pem_str).map_err(|e| Error::Pem(e.to_string()))?;
        match parsed.tag() {
            "PRIVATE KEY" => Self::from_pkcs8_der(parsed.contents()),
            "RSA PRIVATE KEY" => Ok(KeyPair::Rsa(RsaKeyPair::from_der(parsed.contents())?)),
            "EC PRIVATE KEY" => Ok(KeyPair::EcdsaP256(EcdsaKeyPair::from_private_key_der(
                &ECDSA_P256_SHA256_ASN1_SIGNING,
                parsed.contents(),
            )?)),
            other => Err(Error::InvalidKeyFormat(format!(
                "unsupported PEM block: {}",
                other
            ))),
        }
    }

    /// Load a PKCS#8 DER private key (ECDSA P-256 or RSA)
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(kp) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, der) {
            return Ok(KeyPair::EcdsaP256(kp));
        }
        RsaKeyPair::from_pkcs8(der).map(KeyPair::Rsa).map_err(|e| {
            Error::InvalidKeyFormat(format!(
                "PKCS#8 key is neither ECDSA P-256 nor RSA: {}",
                e
            ))
        })
    }

    /// Load a private key from file contents, PEM or DER
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if text.contains("-----BEGIN") {
                return Self::from_pem(text);
            }
        }
        Self::from_pkcs8_der(bytes)
            .or_else(|_| RsaKeyPair::from_der(bytes).map(KeyPair::Rsa).map_err(Error::from))
    }

    /// Get the raw public key bytes (uncompressed point or PKCS#1 RSAPublicKey)
    pub fn public_key_bytes(&self) -> &[u8] {
        match self {
            KeyPair::EcdsaP256(kp) => kp.public_key().as_ref(),
            KeyPair::Rsa(kp) => kp.public_key().as_ref(),
        }
    }

    /// Sign data with this key's default scheme
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.sign_with_scheme(data, self.default_scheme())
    }

    /// Sign data with a specific scheme
    pub fn sign_with_scheme(&self, data: &[u8], scheme: SigningScheme) -> Result<Signature> {
        let rng = SystemRandom::new();
        match (self, scheme) {
            (KeyPair::EcdsaP256(kp), SigningScheme::EcdsaP256Sha256) => {
                let sig = kp.sign(&rng, data)?;
                Ok(Signature::new(sig.as_ref().to_vec()))
            }
            (KeyPair::Rsa(kp), scheme) => {
                let padding: &'static dyn aws_lc_rs::signature::RsaEncoding = match scheme {
                    SigningScheme::RsaPssSha256 => &RSA_PSS_SHA256,
                    SigningScheme::RsaPssSha384 => &RSA_PSS_SHA384,
                    SigningScheme::RsaPssSha512 => &RSA_PSS_SHA512,
                    SigningScheme::RsaPkcs1Sha256 => &RSA_PKCS1_SHA256,
                    SigningScheme::RsaPkcs1Sha384 => &RSA_PKCS1_SHA384,
                    SigningScheme::RsaPkcs1Sha512 => &RSA_PKCS1_SHA512,
                    _ => {
                        return Err(Error::UnsupportedAlgorithm(format!(
                            "RSA key cannot use scheme {}",
                            scheme
                        )));
                    }
                };
                let mut sig = vec![0u8; kp.public_modulus_len()];
                kp.sign(padding, &rng, data, &mut sig)?;
                Ok(Signature::new(sig))
            }
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "key type does not support scheme {}",
                scheme
            ))),
        }
    }

    /// Get the signing scheme for this key pair
    pub fn default_scheme(&self) -> SigningScheme {
        match self {
            KeyPair::EcdsaP256(_) => SigningScheme::EcdsaP256Sha256,
            KeyPair::Rsa(_) => SigningScheme::RsaPssSha256,
        }
    }

    /// Get the public key in DER-encoded SubjectPublicKeyInfo format
    pub fn public_key_to_der(&self) -> Result<Vec<u8>> {
        let algorithm = match self {
            KeyPair::EcdsaP256(_) => AlgorithmIdentifierOwned {
                oid: ID_EC_PUBLIC_KEY,
                parameters: Some(der::Any::encode_from(&SECP_256_R_1)?),
            },
            KeyPair::Rsa(_) => AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: Some(der::Any::encode_from(&der::asn1::Null)?),
            },
        };

        let spki = SubjectPublicKeyInfoOwned {
            algorithm,
            subject_public_key: BitString::from_bytes(self.public_key_bytes())?,
        };

        Ok(spki.to_der()?)
    }
}
