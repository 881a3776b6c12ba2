//! Hashing utilities using aws-lc-rs

use aws_lc_rs::digest::{self, SHA1_FOR_LEGACY_USE_ONLY, SHA256, SHA384, SHA512};
use qsign_types::HashAlgorithm;

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = digest::digest(&SHA256, data);
    let mut result = [0u8; 32];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Hash data using SHA-384
pub fn sha384(data: &[u8]) -> [u8; 48] {
    let digest = digest::digest(&SHA384, data);
    let mut result = [0u8; 48];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Hash data using SHA-512
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = digest::digest(&SHA512, data);
    let mut result = [0u8; 64];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Hash data using SHA-1
///
/// Only for OCSP `CertID` construction, where RFC 6960 responders
/// overwhelmingly expect SHA-1 name and key hashes.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let digest = digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, data);
    let mut result = [0u8; 20];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Hash data with the given algorithm
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => sha256(data).to_vec(),
        HashAlgorithm::Sha384 => sha384(data).to_vec(),
        HashAlgorithm::Sha512 => sha512(data).to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello");
        let expected =
            hex::decode("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
                .unwrap();
        assert_eq!(&hash[..], &expected[..]);
    }

    #[test]
    fn test_sha1() {
        let hash = sha1(b"abc");
        assert_eq!(hex::encode(hash), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_digest_dispatch() {
        assert_eq!(digest(HashAlgorithm::Sha256, b"x").len(), 32);
        assert_eq!(digest(HashAlgorithm::Sha384, b"x").len(), 48);
        assert_eq!(digest(HashAlgorithm::Sha512, b"x"), sha512(b"x").to_vec());
    }
}
