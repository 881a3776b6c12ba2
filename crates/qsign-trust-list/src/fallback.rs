//! Built-in fallback anchors

use crate::anchors::{TrustAnchor, TrustAnchorSet};
use crate::error::{Error, Result};
use qsign_crypto::parse_certificate_info;

/// Source recorded on anchors from the embedded bundle
pub const BUILTIN_SOURCE: &str = "builtin:fallback";

/// PEM bundle compiled into the crate
pub const EMBEDDED_FALLBACK_PEM: &str = include_str!("../anchors/fallback.pem");

/// Parse a PEM bundle of anchor certificates
///
/// Blocks other than `CERTIFICATE` are ignored. Anchors are named after the
/// certificate subject.
pub fn parse_pem_bundle(bundle: &str, source: &str) -> Result<TrustAnchorSet> {
    let blocks = pem::parse_many(bundle)
        .map_err(|e| Error::Certificate(format!("invalid PEM bundle: {}", e)))?;

    let mut set = TrustAnchorSet::new();
    for block in blocks.into_iter().filter(|b| b.tag() == "CERTIFICATE") {
        let der = block.into_contents();
        let info = parse_certificate_info(&der).map_err(|e| Error::Certificate(e.to_string()))?;
        set.insert(TrustAnchor::new(info.subject, der, source));
    }
    Ok(set)
}

/// Anchors of the embedded bundle
pub fn embedded() -> Result<TrustAnchorSet> {
    parse_pem_bundle(EMBEDDED_FALLBACK_PEM, BUILTIN_SOURCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn cert_pem(cn: &str) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn test_embedded_bundle_has_anchors() {
        let set = embedded().unwrap();

        assert!(set.len() >= 1);
        assert!(set.iter().all(|a| a.source == BUILTIN_SOURCE));
        assert!(set
            .iter()
            .any(|a| a.name.contains("D-TRUST Root Class 3 CA 2 2009")));
    }

    #[test]
    fn test_parse_bundle_with_comments() {
        let bundle = format!(
            "# comment\n{}\nsome text\n{}",
            cert_pem("First CA"),
            cert_pem("Second CA")
        );
        let set = parse_pem_bundle(&bundle, BUILTIN_SOURCE).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|a| a.source == BUILTIN_SOURCE));
        assert!(set.iter().any(|a| a.name.contains("First CA")));
    }

    #[test]
    fn test_parse_bundle_rejects_garbage_certificate() {
        let bundle = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert!(parse_pem_bundle(bundle, BUILTIN_SOURCE).is_err());
    }
}
