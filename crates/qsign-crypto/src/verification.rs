//! Signature verification using aws-lc-rs

use crate::error::{Error, Result};
use crate::oids::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, ID_EC_PUBLIC_KEY, ID_RSASSA_PSS,
    RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use crate::signing::SigningScheme;
use aws_lc_rs::signature::{
    UnparsedPublicKey, VerificationAlgorithm, ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA384_ASN1,
    ECDSA_P384_SHA256_ASN1, ECDSA_P384_SHA384_ASN1, RSA_PKCS1_2048_8192_SHA256,
    RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512, RSA_PSS_2048_8192_SHA256,
    RSA_PSS_2048_8192_SHA384, RSA_PSS_2048_8192_SHA512,
};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode, Sequence};
use qsign_types::HashAlgorithm;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

/// A public key for verification
pub struct VerificationKey {
    /// Raw public key bytes (uncompressed EC point or PKCS#1 RSAPublicKey)
    pub bytes: Vec<u8>,
    /// The scheme to use for verification
    pub scheme: SigningScheme,
}

impl VerificationKey {
    /// Create a new verification key
    pub fn new(bytes: Vec<u8>, scheme: SigningScheme) -> Self {
        Self { bytes, scheme }
    }

    /// Create a verification key from a SubjectPublicKeyInfo
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned, scheme: SigningScheme) -> Self {
        Self::new(spki.subject_public_key.raw_bytes().to_vec(), scheme)
    }

    /// Verify a signature over data
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let algorithm: &'static dyn VerificationAlgorithm = match self.scheme {
            SigningScheme::EcdsaP256Sha256 => &ECDSA_P256_SHA256_ASN1,
            SigningScheme::EcdsaP256Sha384 => &ECDSA_P256_SHA384_ASN1,
            SigningScheme::EcdsaP384Sha256 => &ECDSA_P384_SHA256_ASN1,
            SigningScheme::EcdsaP384Sha384 => &ECDSA_P384_SHA384_ASN1,
            SigningScheme::RsaPssSha256 => &RSA_PSS_2048_8192_SHA256,
            SigningScheme::RsaPssSha384 => &RSA_PSS_2048_8192_SHA384,
            SigningScheme::RsaPssSha512 => &RSA_PSS_2048_8192_SHA512,
            SigningScheme::RsaPkcs1Sha256 => &RSA_PKCS1_2048_8192_SHA256,
            SigningScheme::RsaPkcs1Sha384 => &RSA_PKCS1_2048_8192_SHA384,
            SigningScheme::RsaPkcs1Sha512 => &RSA_PKCS1_2048_8192_SHA512,
        };

        UnparsedPublicKey::new(algorithm, &self.bytes)
            .verify(data, signature)
            .map_err(|_| Error::Verification(format!("{} signature invalid", self.scheme)))
    }
}

/// Verify a signature using the specified scheme
pub fn verify_signature(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
    scheme: SigningScheme,
) -> Result<()> {
    VerificationKey::new(public_key.to_vec(), scheme).verify(data, signature)
}

/// RSASSA-PSS-params (RFC 4055)
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct RsaPssParams {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    hash_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    mask_gen_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    salt_length: Option<u32>,
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    trailer_field: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    EcP256,
    EcP384,
    Rsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Ecdsa,
    Pkcs1,
    Pss,
}

fn key_kind(spki: &SubjectPublicKeyInfoOwned) -> Result<KeyKind> {
    let oid = spki.algorithm.oid;
    if oid == RSA_ENCRYPTION || oid == ID_RSASSA_PSS {
        return Ok(KeyKind::Rsa);
    }
    if oid != ID_EC_PUBLIC_KEY {
        return Err(Error::UnsupportedAlgorithm(format!(
            "public key algorithm {}",
            oid
        )));
    }

    let params = spki
        .algorithm
        .parameters
        .as_ref()
        .ok_or_else(|| Error::UnsupportedAlgorithm("EC key without curve".to_string()))?;
    let curve = ObjectIdentifier::from_bytes(params.value())
        .map_err(|e| Error::Der(format!("failed to parse EC curve OID: {}", e)))?;

    if curve == SECP_256_R_1 {
        Ok(KeyKind::EcP256)
    } else if curve == SECP_384_R_1 {
        Ok(KeyKind::EcP384)
    } else {
        Err(Error::UnsupportedAlgorithm(format!("EC curve {}", curve)))
    }
}

fn hash_from_oid(oid: &ObjectIdentifier) -> Result<HashAlgorithm> {
    HashAlgorithm::from_oid(&oid.to_string())
        .map_err(|_| Error::UnsupportedAlgorithm(format!("digest algorithm {}", oid)))
}

fn pss_hash(
    signature_algorithm: &AlgorithmIdentifierOwned,
    digest_algorithm: Option<&ObjectIdentifier>,
) -> Result<HashAlgorithm> {
    if let Some(params) = &signature_algorithm.parameters {
        let params = RsaPssParams::from_der(&params.to_der()?)?;
        if let Some(hash) = params.hash_algorithm {
            return hash_from_oid(&hash.oid);
        }
    }
    // Absent hashAlgorithm means SHA-1, which is not accepted; a digest
    // algorithm declared alongside (as CMS does) takes precedence.
    digest_algorithm
        .map(hash_from_oid)
        .unwrap_or_else(|| Err(Error::UnsupportedAlgorithm("RSA-PSS with SHA-1".to_string())))
}

/// Resolve the verification scheme for a signature
///
/// `signature_algorithm` is the algorithm identifier attached to the signature,
/// `digest_algorithm` the separately declared digest (CMS `digestAlgorithm`),
/// and `spki` the signer's public key.
pub fn resolve_scheme(
    signature_algorithm: &AlgorithmIdentifierOwned,
    digest_algorithm: Option<&ObjectIdentifier>,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<SigningScheme> {
    let oid = signature_algorithm.oid;
    let declared_digest = || {
        digest_algorithm.map(hash_from_oid).unwrap_or_else(|| {
            Err(Error::UnsupportedAlgorithm(format!(
                "{} requires a digest algorithm",
                oid
            )))
        })
    };

    let (padding, hash) = if oid == ECDSA_WITH_SHA_256 {
        (Padding::Ecdsa, HashAlgorithm::Sha256)
    } else if oid == ECDSA_WITH_SHA_384 {
        (Padding::Ecdsa, HashAlgorithm::Sha384)
    } else if oid == ECDSA_WITH_SHA_512 {
        (Padding::Ecdsa, HashAlgorithm::Sha512)
    } else if oid == SHA_256_WITH_RSA_ENCRYPTION {
        (Padding::Pkcs1, HashAlgorithm::Sha256)
    } else if oid == SHA_384_WITH_RSA_ENCRYPTION {
        (Padding::Pkcs1, HashAlgorithm::Sha384)
    } else if oid == SHA_512_WITH_RSA_ENCRYPTION {
        (Padding::Pkcs1, HashAlgorithm::Sha512)
    } else if oid == ID_RSASSA_PSS {
        (Padding::Pss, pss_hash(signature_algorithm, digest_algorithm)?)
    } else if oid == RSA_ENCRYPTION {
        (Padding::Pkcs1, declared_digest()?)
    } else if oid == ID_EC_PUBLIC_KEY {
        (Padding::Ecdsa, declared_digest()?)
    } else {
        return Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm {}",
            oid
        )));
    };

    let scheme = match (key_kind(spki)?, padding, hash) {
        (KeyKind::EcP256, Padding::Ecdsa, HashAlgorithm::Sha256) => SigningScheme::EcdsaP256Sha256,
        (KeyKind::EcP256, Padding::Ecdsa, HashAlgorithm::Sha384) => SigningScheme::EcdsaP256Sha384,
        (KeyKind::EcP384, Padding::Ecdsa, HashAlgorithm::Sha256) => SigningScheme::EcdsaP384Sha256,
        (KeyKind::EcP384, Padding::Ecdsa, HashAlgorithm::Sha384) => SigningScheme::EcdsaP384Sha384,
        (KeyKind::Rsa, Padding::Pkcs1, HashAlgorithm::Sha256) => SigningScheme::RsaPkcs1Sha256,
        (KeyKind::Rsa, Padding::Pkcs1, HashAlgorithm::Sha384) => SigningScheme::RsaPkcs1Sha384,
        (KeyKind::Rsa, Padding::Pkcs1, HashAlgorithm::Sha512) => SigningScheme::RsaPkcs1Sha512,
        (KeyKind::Rsa, Padding::Pss, HashAlgorithm::Sha256) => SigningScheme::RsaPssSha256,
        (KeyKind::Rsa, Padding::Pss, HashAlgorithm::Sha384) => SigningScheme::RsaPssSha384,
        (KeyKind::Rsa, Padding::Pss, HashAlgorithm::Sha512) => SigningScheme::RsaPssSha512,
        (kind, padding, hash) => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "{:?} key with {:?} signature over {}",
                kind, padding, hash
            )));
        }
    };

    tracing::debug!("Resolved signature scheme {} from {}", scheme, oid);
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oids::{ID_SHA_256, ID_SHA_384};
    use crate::signing::KeyPair;
    use rstest::rstest;

    fn ec_p256_spki() -> SubjectPublicKeyInfoOwned {
        let kp = KeyPair::generate_ecdsa_p256().unwrap();
        SubjectPublicKeyInfoOwned::from_der(&kp.public_key_to_der().unwrap()).unwrap()
    }

    fn rsa_spki() -> SubjectPublicKeyInfoOwned {
        SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: None,
            },
            subject_public_key: der::asn1::BitString::from_bytes(&[0x30, 0x00]).unwrap(),
        }
    }

    fn alg(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid,
            parameters: None,
        }
    }

    #[rstest]
    #[case(ECDSA_WITH_SHA_256, None, SigningScheme::EcdsaP256Sha256)]
    #[case(ECDSA_WITH_SHA_384, None, SigningScheme::EcdsaP256Sha384)]
    #[case(ID_EC_PUBLIC_KEY, Some(ID_SHA_256), SigningScheme::EcdsaP256Sha256)]
    fn test_resolve_ecdsa(
        #[case] sig_oid: ObjectIdentifier,
        #[case] digest: Option<ObjectIdentifier>,
        #[case] expected: SigningScheme,
    ) {
        let scheme = resolve_scheme(&alg(sig_oid), digest.as_ref(), &ec_p256_spki()).unwrap();
        assert_eq!(scheme, expected);
    }

    #[rstest]
    #[case(SHA_256_WITH_RSA_ENCRYPTION, None, SigningScheme::RsaPkcs1Sha256)]
    #[case(SHA_512_WITH_RSA_ENCRYPTION, None, SigningScheme::RsaPkcs1Sha512)]
    #[case(RSA_ENCRYPTION, Some(ID_SHA_384), SigningScheme::RsaPkcs1Sha384)]
    #[case(ID_RSASSA_PSS, Some(ID_SHA_256), SigningScheme::RsaPssSha256)]
    fn test_resolve_rsa(
        #[case] sig_oid: ObjectIdentifier,
        #[case] digest: Option<ObjectIdentifier>,
        #[case] expected: SigningScheme,
    ) {
        let scheme = resolve_scheme(&alg(sig_oid), digest.as_ref(), &rsa_spki()).unwrap();
        assert_eq!(scheme, expected);
    }

    #[test]
    fn test_resolve_pss_params_hash() {
        let params = RsaPssParams {
            hash_algorithm: Some(alg(crate::oids::ID_SHA_512)),
            mask_gen_algorithm: None,
            salt_length: Some(64),
            trailer_field: None,
        };
        let sig_alg = AlgorithmIdentifierOwned {
            oid: ID_RSASSA_PSS,
            parameters: Some(der::Any::encode_from(&params).unwrap()),
        };
        let scheme = resolve_scheme(&sig_alg, Some(&ID_SHA_256), &rsa_spki()).unwrap();
        assert_eq!(scheme, SigningScheme::RsaPssSha512);
    }

    #[test]
    fn test_resolve_mismatched_key() {
        let err = resolve_scheme(&alg(SHA_256_WITH_RSA_ENCRYPTION), None, &ec_p256_spki());
        assert!(matches!(err, Err(Error::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_resolve_bare_key_oid_needs_digest() {
        let err = resolve_scheme(&alg(RSA_ENCRYPTION), None, &rsa_spki()).unwrap_err();
        assert!(err.to_string().contains("requires a digest algorithm"));
    }

    #[test]
    fn test_verify_through_spki() {
        let kp = KeyPair::generate_ecdsa_p256().unwrap();
        let spki = SubjectPublicKeyInfoOwned::from_der(&kp.public_key_to_der().unwrap()).unwrap();
        let sig = kp.sign(b"data").unwrap();

        let vk = VerificationKey::from_spki(&spki, SigningScheme::EcdsaP256Sha256);
        assert!(vk.verify(b"data", sig.as_bytes()).is_ok());
    }

    #[test]
    fn test_verify_bad_signature() {
        let kp = KeyPair::generate_ecdsa_p256().unwrap();
        let result = verify_signature(
            kp.public_key_bytes(),
            b"data",
            &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01],
            SigningScheme::EcdsaP256Sha256,
        );
        assert!(matches!(result, Err(Error::Verification(_))));
    }
}
