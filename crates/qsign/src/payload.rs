//! Canonical signature payload
//!
//! The payload binds the content digest, caller metadata, signing time and
//! certificate identifier into one byte string. It is serialized with RFC 8785
//! JSON canonicalization so anyone holding the package fields can rebuild the
//! exact bytes that were signed and timestamped.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use qsign_types::{HashAlgorithm, Sha256Hash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structure that is signed and timestamped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturePayload {
    /// Identifier of the signing certificate or development key
    pub certificate_id: String,
    /// Lowercase hex SHA-256 of the content
    pub content_hash: String,
    /// Name of the content hash algorithm
    pub hash_algorithm: String,
    /// Caller supplied metadata
    pub metadata: Value,
    /// RFC 3339 signing time with second precision
    pub signing_time: String,
}

impl SignaturePayload {
    /// Build the payload for `content`
    ///
    /// `signing_time` is truncated to whole seconds.
    pub fn from_content<M: Serialize + ?Sized>(
        content: &[u8],
        metadata: &M,
        signing_time: DateTime<Utc>,
        certificate_id: impl Into<String>,
    ) -> Result<Self> {
        let content_hash = Sha256Hash::from_bytes(qsign_crypto::sha256(content));
        Self::from_parts(&content_hash, metadata, signing_time, certificate_id)
    }

    /// Build the payload from an already computed content digest
    pub fn from_parts<M: Serialize + ?Sized>(
        content_hash: &Sha256Hash,
        metadata: &M,
        signing_time: DateTime<Utc>,
        certificate_id: impl Into<String>,
    ) -> Result<Self> {
        let metadata = serde_json::to_value(metadata).map_err(|e| {
            Error::Configuration(format!("metadata is not JSON serializable: {}", e))
        })?;

        Ok(Self {
            certificate_id: certificate_id.into(),
            content_hash: content_hash.to_hex(),
            hash_algorithm: HashAlgorithm::Sha256.as_str().to_string(),
            metadata,
            signing_time: signing_time
                .trunc_subsecs(0)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    /// RFC 8785 canonical JSON bytes
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json_canonicalizer::to_vec(self)
            .map_err(|e| Error::ProtocolViolation(format!("failed to canonicalize payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 30, 9, 15, 0).unwrap()
            + chrono::Duration::milliseconds(750)
    }

    #[test]
    fn test_canonical_bytes_are_sorted_and_compact() {
        let payload = SignaturePayload::from_content(
            b"report",
            &json!({"zeta": 1, "alpha": {"b": true, "a": null}}),
            time(),
            "sha256:00",
        )
        .unwrap();

        let text = String::from_utf8(payload.to_canonical_bytes().unwrap()).unwrap();
        let expected = format!(
            concat!(
                r#"{{"certificate_id":"sha256:00","content_hash":"{}","#,
                r#""hash_algorithm":"{}","metadata":{{"alpha":{{"a":null,"b":true}},"zeta":1}},"#,
                r#""signing_time":"2026-04-30T09:15:00Z"}}"#
            ),
            Sha256Hash::from_bytes(qsign_crypto::sha256(b"report")).to_hex(),
            HashAlgorithm::Sha256.as_str(),
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_key_order_does_not_change_bytes() {
        let a = SignaturePayload::from_content(b"x", &json!({"a": 1, "b": 2}), time(), "id")
            .unwrap();
        let b = SignaturePayload::from_content(b"x", &json!({"b": 2, "a": 1}), time(), "id")
            .unwrap();

        assert_eq!(
            a.to_canonical_bytes().unwrap(),
            b.to_canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_rebuilt_from_digest_matches() {
        let hash = Sha256Hash::from_bytes(qsign_crypto::sha256(b"content"));
        let direct =
            SignaturePayload::from_content(b"content", &json!([1, 2]), time(), "id").unwrap();
        let rebuilt = SignaturePayload::from_parts(&hash, &json!([1, 2]), time(), "id").unwrap();

        assert_eq!(direct, rebuilt);
    }
}
