//! Signature package format
//!
//! The package is the artifact produced by signing. It carries the detached
//! signature, the evidence that makes it verifiable later (timestamp token,
//! optional revocation response, certificate chain) and the advisory
//! post-quantum migration data.

use crate::encoding::Sha256Hash;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Validation level reached by a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureFormat {
    /// Signature plus trusted timestamp
    #[serde(rename = "CAdES-B-T")]
    BaselineT,
    /// Baseline-T plus revocation evidence for long-term validation
    #[serde(rename = "CAdES-B-LT")]
    BaselineLt,
}

impl SignatureFormat {
    /// Short profile name
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureFormat::BaselineT => "Baseline-T",
            SignatureFormat::BaselineLt => "Baseline-LT",
        }
    }

    /// Wire name used in serialized packages
    pub fn wire_name(&self) -> &'static str {
        match self {
            SignatureFormat::BaselineT => "CAdES-B-T",
            SignatureFormat::BaselineLt => "CAdES-B-LT",
        }
    }

    /// Format implied by the presence of revocation evidence
    pub fn for_evidence(has_revocation_evidence: bool) -> Self {
        if has_revocation_evidence {
            SignatureFormat::BaselineLt
        } else {
            SignatureFormat::BaselineT
        }
    }
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Baseline-T" | "CAdES-B-T" => Ok(SignatureFormat::BaselineT),
            "Baseline-LT" | "CAdES-B-LT" => Ok(SignatureFormat::BaselineLt),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

/// Progress of the post-quantum migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Classical algorithms only, migration scheduled
    Planned,
    /// Hybrid classical + post-quantum signatures
    Hybrid,
    /// Post-quantum only
    Complete,
}

/// Advisory description of how a package will move to post-quantum algorithms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    /// Current migration status
    pub status: MigrationStatus,
    /// Algorithms the package is expected to be re-signed with
    pub target_algorithms: Vec<String>,
    /// Free-form guidance
    pub notes: String,
}

impl MigrationPlan {
    /// The plan attached to every package signed with classical algorithms
    pub fn advisory() -> Self {
        Self {
            status: MigrationStatus::Planned,
            target_algorithms: vec!["ML-DSA-65".to_string(), "SLH-DSA-SHA2-128s".to_string()],
            notes: "Classical signature. Re-sign with a hybrid or post-quantum algorithm \
                    once qualified trust services offer one."
                .to_string(),
        }
    }
}

impl Default for MigrationPlan {
    fn default() -> Self {
        Self::advisory()
    }
}

/// A completed signature over one filing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePackage {
    /// Signature algorithm name
    pub algorithm: String,
    /// Detached signature over the canonical payload
    #[serde(with = "crate::base64_bytes")]
    pub signature: Vec<u8>,
    /// SHA-256 of the signed content
    pub content_hash: Sha256Hash,
    /// Signing time recorded in the payload
    pub signing_time: DateTime<Utc>,
    /// Identifier of the signing certificate or key recorded in the payload
    pub certificate_id: String,
    /// DER certificates, leaf first
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "crate::base64_bytes_seq"
    )]
    pub certificate_chain: Vec<Vec<u8>>,
    /// Validation level
    pub signature_format: SignatureFormat,
    /// RFC 3161 token (CMS ContentInfo, DER)
    #[serde(with = "crate::base64_bytes")]
    pub timestamp_token: Vec<u8>,
    /// Digest the timestamp authority attested to
    #[serde(with = "crate::base64_bytes")]
    pub timestamp_message_imprint: Vec<u8>,
    /// OCSP response (DER) backing the long-term validation claim
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::base64_bytes_opt"
    )]
    pub ocsp_response: Option<Vec<u8>>,
    /// Whether the signature algorithm resists quantum attacks
    pub quantum_ready: bool,
    /// Advisory migration data
    pub migration_plan: MigrationPlan,
}

impl SignaturePackage {
    /// Parse a package from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Json)
    }

    /// Serialize the package to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Json)
    }

    /// Serialize the package to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::Json)
    }

    /// The signing certificate, if the package carries a chain
    pub fn signing_certificate(&self) -> Option<&[u8]> {
        self.certificate_chain.first().map(Vec::as_slice)
    }

    /// Whether revocation evidence backs this package
    pub fn is_long_term(&self) -> bool {
        self.signature_format == SignatureFormat::BaselineLt && self.ocsp_response.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SignaturePackage {
        SignaturePackage {
            algorithm: "ECDSA_P256_SHA256".to_string(),
            signature: vec![1, 2, 3],
            content_hash: Sha256Hash::from_bytes([7u8; 32]),
            signing_time: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            certificate_id: "ephemeral:00".to_string(),
            certificate_chain: vec![],
            signature_format: SignatureFormat::BaselineT,
            timestamp_token: vec![0x30, 0x00],
            timestamp_message_imprint: vec![9u8; 32],
            ocsp_response: None,
            quantum_ready: false,
            migration_plan: MigrationPlan::advisory(),
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(SignatureFormat::BaselineT.as_str(), "Baseline-T");
        assert_eq!(SignatureFormat::BaselineLt.wire_name(), "CAdES-B-LT");
        assert_eq!(
            "CAdES-B-T".parse::<SignatureFormat>().unwrap(),
            SignatureFormat::BaselineT
        );
        assert_eq!(SignatureFormat::for_evidence(true), SignatureFormat::BaselineLt);
        assert_eq!(SignatureFormat::for_evidence(false), SignatureFormat::BaselineT);
    }

    #[test]
    fn test_package_json_fields() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["signatureFormat"], "CAdES-B-T");
        assert_eq!(value["signature"], "AQID");
        assert_eq!(value["contentHash"], hex::encode([7u8; 32]));
        assert_eq!(value["quantumReady"], false);
        assert_eq!(value["migrationPlan"]["status"], "planned");
        assert!(value.get("ocspResponse").is_none());
        assert!(value.get("certificateChain").is_none());
    }

    #[test]
    fn test_package_parse_with_evidence() {
        let mut package = sample();
        package.signature_format = SignatureFormat::BaselineLt;
        package.ocsp_response = Some(vec![0x30, 0x03, 0x0a, 0x01, 0x00]);
        package.certificate_chain = vec![vec![0x30, 0x00]];

        let parsed = SignaturePackage::from_json(&package.to_json_pretty().unwrap()).unwrap();
        assert!(parsed.is_long_term());
        assert_eq!(parsed.signing_certificate(), Some(&[0x30, 0x00][..]));
        assert_eq!(parsed, package);
    }
}
