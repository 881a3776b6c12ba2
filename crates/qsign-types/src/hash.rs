//! Hash algorithm types and utilities

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Get the digest size in bytes for this algorithm
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Get the dotted OID for this algorithm
    pub fn oid(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    /// Look up an algorithm by dotted OID
    pub fn from_oid(oid: &str) -> Result<Self> {
        match oid {
            "2.16.840.1.101.3.4.2.1" => Ok(HashAlgorithm::Sha256),
            "2.16.840.1.101.3.4.2.2" => Ok(HashAlgorithm::Sha384),
            "2.16.840.1.101.3.4.2.3" => Ok(HashAlgorithm::Sha512),
            other => Err(Error::InvalidHashAlgorithm(format!("unsupported OID {}", other))),
        }
    }

    /// Canonical display name ("SHA-256", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "SHA-256" | "SHA256" | "SHA2-256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" | "SHA384" | "SHA2-384" => Ok(HashAlgorithm::Sha384),
            "SHA-512" | "SHA512" | "SHA2-512" => Ok(HashAlgorithm::Sha512),
            _ => Err(Error::InvalidHashAlgorithm(s.to_string())),
        }
    }
}

/// Message imprint combining algorithm and digest
///
/// This is what a timestamp authority attests to: it never sees the payload,
/// only this digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageImprint {
    /// Hash algorithm used
    pub algorithm: HashAlgorithm,
    /// Hash digest (base64 encoded in JSON)
    #[serde(with = "crate::base64_bytes")]
    pub digest: Vec<u8>,
}

impl MessageImprint {
    /// Create a new message imprint
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_lookup() {
        for alg in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(HashAlgorithm::from_oid(alg.oid()).unwrap(), alg);
        }
        assert!(HashAlgorithm::from_oid("1.3.14.3.2.26").is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "sha2_256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha256
        );
        assert_eq!(
            "SHA-384".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha384
        );
        assert_eq!(
            "SHA2_512".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha512
        );
        assert_eq!(
            "sha256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha256
        );
        assert!("sha2-1".parse::<HashAlgorithm>().is_err());
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_serde_name() {
        let json = serde_json::to_string(&HashAlgorithm::Sha256).unwrap();
        assert_eq!(json, "\"SHA-256\"");
    }
}
