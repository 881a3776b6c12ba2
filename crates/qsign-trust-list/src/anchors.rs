//! Trust anchors and certificate path validation

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use qsign_crypto::{certificate_fingerprint, oids, parse_certificate_info};
use qsign_types::Sha256Hash;
use rustls_pki_types::{CertificateDer, TrustAnchor as WebPkiAnchor, UnixTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use webpki::{anchor_from_trusted_cert, EndEntityCert, KeyUsage, ALL_VERIFICATION_ALGS};

static ID_KP_TIME_STAMPING: ObjectIdentifier = oids::ID_KP_TIME_STAMPING;
static ID_KP_OCSP_SIGNING: ObjectIdentifier = oids::ID_KP_OCSP_SIGNING;
static ID_KP_EMAIL_PROTECTION: ObjectIdentifier = oids::ID_KP_EMAIL_PROTECTION;

/// A certificate trusted as the root of a validation path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Display name, unique within a [`TrustAnchorSet`]
    pub name: String,
    /// DER encoded certificate
    #[serde(with = "qsign_types::encoding::base64_bytes")]
    pub certificate: Vec<u8>,
    /// Where the anchor came from (trusted list URL or `builtin:*`)
    pub source: String,
}

impl TrustAnchor {
    /// Create a new anchor
    pub fn new(name: impl Into<String>, certificate: Vec<u8>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            certificate,
            source: source.into(),
        }
    }

    /// SHA-256 fingerprint of the certificate
    pub fn fingerprint(&self) -> Sha256Hash {
        certificate_fingerprint(&self.certificate)
    }
}

/// Extended key usage a validated certificate must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// id-kp-timeStamping, required
    TimeStamping,
    /// id-kp-OCSPSigning, required
    OcspSigning,
    /// Document signing: emailProtection if an EKU extension is present
    DocumentSigning,
}

impl KeyPurpose {
    fn key_usage(self) -> KeyUsage {
        match self {
            KeyPurpose::TimeStamping => KeyUsage::required(ID_KP_TIME_STAMPING.as_bytes()),
            KeyPurpose::OcspSigning => KeyUsage::required(ID_KP_OCSP_SIGNING.as_bytes()),
            KeyPurpose::DocumentSigning => {
                KeyUsage::required_if_present(ID_KP_EMAIL_PROTECTION.as_bytes())
            }
        }
    }
}

/// Named, deduplicated collection of trust anchors
///
/// Anchors are keyed by name; the same certificate is only stored once no
/// matter how many lists publish it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TrustAnchor>", into = "Vec<TrustAnchor>")]
pub struct TrustAnchorSet {
    anchors: BTreeMap<String, TrustAnchor>,
    fingerprints: BTreeSet<Sha256Hash>,
}

impl From<Vec<TrustAnchor>> for TrustAnchorSet {
    fn from(anchors: Vec<TrustAnchor>) -> Self {
        let mut set = TrustAnchorSet::new();
        for anchor in anchors {
            set.insert(anchor);
        }
        set
    }
}

impl From<TrustAnchorSet> for Vec<TrustAnchor> {
    fn from(set: TrustAnchorSet) -> Self {
        set.anchors.into_values().collect()
    }
}

impl TrustAnchorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an anchor
    ///
    /// Returns `false` when the certificate is already present. A name
    /// already used by a different certificate gets a `#n` suffix.
    pub fn insert(&mut self, mut anchor: TrustAnchor) -> bool {
        if !self.fingerprints.insert(anchor.fingerprint()) {
            return false;
        }

        if self.anchors.contains_key(&anchor.name) {
            let base = anchor.name.clone();
            let mut n = 2;
            while self.anchors.contains_key(&format!("{}#{}", base, n)) {
                n += 1;
            }
            anchor.name = format!("{}#{}", base, n);
        }

        self.anchors.insert(anchor.name.clone(), anchor);
        true
    }

    /// Insert every anchor of `other`, returning how many were new
    pub fn merge(&mut self, other: TrustAnchorSet) -> usize {
        Vec::from(other)
            .into_iter()
            .filter(|anchor| self.insert(anchor.clone()))
            .count()
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the set holds no anchors
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Look up an anchor by name
    pub fn get(&self, name: &str) -> Option<&TrustAnchor> {
        self.anchors.get(name)
    }

    /// Iterate anchors in name order
    pub fn iter(&self) -> impl Iterator<Item = &TrustAnchor> {
        self.anchors.values()
    }

    /// Whether the exact certificate is an anchor
    pub fn contains_certificate(&self, cert_der: &[u8]) -> bool {
        self.fingerprints.contains(&certificate_fingerprint(cert_der))
    }

    fn webpki_anchors(&self) -> Vec<WebPkiAnchor<'static>> {
        self.anchors
            .values()
            .filter_map(|anchor| {
                let der = CertificateDer::from(anchor.certificate.as_slice());
                match anchor_from_trusted_cert(&der) {
                    Ok(ta) => Some(ta.to_owned()),
                    Err(e) => {
                        tracing::debug!("Skipping unusable anchor {}: {}", anchor.name, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Validate `leaf` up to one of the anchors at time `at`
    ///
    /// `intermediates` may contain any certificates that help build the path,
    /// including the leaf itself and anchors. The leaf must carry the
    /// extended key usage demanded by `purpose`.
    pub fn verify_chain(
        &self,
        leaf: &[u8],
        intermediates: &[Vec<u8>],
        at: DateTime<Utc>,
        purpose: KeyPurpose,
    ) -> Result<()> {
        if self.is_empty() {
            return Err(Error::TrustChain("no trust anchors available".to_string()));
        }

        // A certificate published directly on a trusted list needs no path
        if self.contains_certificate(leaf) {
            let info = parse_certificate_info(leaf)
                .map_err(|e| Error::Certificate(e.to_string()))?;
            if !info.is_valid_at(at) {
                return Err(Error::TrustChain(format!(
                    "trusted certificate {} is not valid at {}",
                    info.subject, at
                )));
            }
            tracing::debug!("{} is itself a trust anchor", info.subject);
            return Ok(());
        }

        let leaf_der = CertificateDer::from(leaf);
        let end_entity = EndEntityCert::try_from(&leaf_der).map_err(|e| {
            Error::Certificate(format!("failed to parse end-entity certificate: {}", e))
        })?;

        let anchors = self.webpki_anchors();
        let intermediate_ders: Vec<CertificateDer<'_>> = intermediates
            .iter()
            .filter(|der| der.as_slice() != leaf)
            .map(|der| CertificateDer::from(der.as_slice()))
            .collect();

        let time = UnixTime::since_unix_epoch(std::time::Duration::from_secs(
            at.timestamp().max(0) as u64,
        ));

        tracing::debug!(
            "Verifying chain against {} anchor(s) with {} intermediate(s) at {}",
            anchors.len(),
            intermediate_ders.len(),
            at
        );

        end_entity
            .verify_for_usage(
                ALL_VERIFICATION_ALGS,
                &anchors,
                &intermediate_ders,
                time,
                purpose.key_usage(),
                None,
                None,
            )
            .map_err(|e| {
                Error::TrustChain(format!("certificate does not chain to a trusted anchor: {}", e))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rcgen::{
        BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    };

    struct Pki {
        root_der: Vec<u8>,
        tsa_der: Vec<u8>,
        other_root_der: Vec<u8>,
    }

    fn ca_params(name: &str) -> CertificateParams {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(2040, 1, 1);
        params
    }

    fn pki() -> Pki {
        let root_key = KeyPair::generate().unwrap();
        let root = ca_params("Test Root").self_signed(&root_key).unwrap();

        let tsa_key = KeyPair::generate().unwrap();
        let mut tsa_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        tsa_params.distinguished_name.push(DnType::CommonName, "Test TSA");
        tsa_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::TimeStamping];
        tsa_params.not_before = rcgen::date_time_ymd(2021, 1, 1);
        tsa_params.not_after = rcgen::date_time_ymd(2035, 1, 1);
        let tsa = tsa_params.signed_by(&tsa_key, &root, &root_key).unwrap();

        let other_key = KeyPair::generate().unwrap();
        let other = ca_params("Other Root").self_signed(&other_key).unwrap();

        Pki {
            root_der: root.der().to_vec(),
            tsa_der: tsa.der().to_vec(),
            other_root_der: other.der().to_vec(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_insert_dedupes_by_certificate() {
        let pki = pki();
        let mut set = TrustAnchorSet::new();

        assert!(set.insert(TrustAnchor::new("root", pki.root_der.clone(), "a")));
        assert!(!set.insert(TrustAnchor::new("root-again", pki.root_der.clone(), "b")));
        assert!(set.insert(TrustAnchor::new("root", pki.other_root_der.clone(), "b")));

        assert_eq!(set.len(), 2);
        assert!(set.get("root").is_some());
        assert_eq!(set.get("root#2").unwrap().certificate, pki.other_root_der);
        assert!(set.contains_certificate(&pki.root_der));
        assert!(!set.contains_certificate(&pki.tsa_der));
    }

    #[test]
    fn test_serde_preserves_anchors() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![
            TrustAnchor::new("a", pki.root_der.clone(), "builtin:fallback"),
            TrustAnchor::new("b", pki.other_root_der.clone(), "https://tl.example/tl.xml"),
        ]);

        let json = serde_json::to_string(&set).unwrap();
        assert!(json.starts_with('['));
        let decoded: TrustAnchorSet = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_merge_counts_new_anchors() {
        let pki = pki();
        let mut left = TrustAnchorSet::from(vec![TrustAnchor::new("a", pki.root_der.clone(), "x")]);
        let right = TrustAnchorSet::from(vec![
            TrustAnchor::new("a", pki.root_der.clone(), "y"),
            TrustAnchor::new("b", pki.other_root_der.clone(), "y"),
        ]);

        assert_eq!(left.merge(right), 1);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn test_verify_chain_to_anchor() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![TrustAnchor::new("root", pki.root_der.clone(), "t")]);

        set.verify_chain(&pki.tsa_der, &[], at(), KeyPurpose::TimeStamping)
            .unwrap();
    }

    #[test]
    fn test_verify_chain_wrong_purpose() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![TrustAnchor::new("root", pki.root_der.clone(), "t")]);

        let err = set
            .verify_chain(&pki.tsa_der, &[], at(), KeyPurpose::OcspSigning)
            .unwrap_err();
        assert!(matches!(err, Error::TrustChain(_)));
    }

    #[test]
    fn test_verify_chain_unknown_root() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![TrustAnchor::new(
            "other",
            pki.other_root_der.clone(),
            "t",
        )]);

        let err = set
            .verify_chain(&pki.tsa_der, &[], at(), KeyPurpose::TimeStamping)
            .unwrap_err();
        assert!(matches!(err, Error::TrustChain(_)));
    }

    #[test]
    fn test_verify_chain_outside_validity() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![TrustAnchor::new("root", pki.root_der.clone(), "t")]);
        let late = Utc.with_ymd_and_hms(2036, 1, 1, 0, 0, 0).unwrap();

        assert!(set
            .verify_chain(&pki.tsa_der, &[], late, KeyPurpose::TimeStamping)
            .is_err());
    }

    #[test]
    fn test_listed_leaf_is_trusted_directly() {
        let pki = pki();
        let set = TrustAnchorSet::from(vec![TrustAnchor::new("tsa", pki.tsa_der.clone(), "t")]);

        set.verify_chain(&pki.tsa_der, &[], at(), KeyPurpose::TimeStamping)
            .unwrap();
    }

    #[test]
    fn test_empty_set_rejects() {
        let pki = pki();
        let err = TrustAnchorSet::new()
            .verify_chain(&pki.tsa_der, &[], at(), KeyPurpose::TimeStamping)
            .unwrap_err();
        assert!(err.to_string().contains("no trust anchors"));
    }
}
