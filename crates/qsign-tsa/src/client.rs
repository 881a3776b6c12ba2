//! TSA client for RFC 3161 Time-Stamp Protocol

use crate::asn1::{Asn1MessageImprint, TimeStampReq, TimeStampResp};
use crate::error::{Error, Result};
use crate::verify::{verify_timestamp_response, TimestampToken, VerifyOpts};
use const_oid::ObjectIdentifier;
use der::asn1::Int;
use qsign_transport::{HttpTransport, ReqwestTransport};
use qsign_trust_list::TrustListStore;
use qsign_types::HashAlgorithm;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Content type of timestamp requests
pub const TIMESTAMP_QUERY_CONTENT_TYPE: &str = "application/timestamp-query";

/// Default timeout for a timestamp request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`TimestampClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampConfig {
    /// Primary authority endpoint
    pub url: String,
    /// Authority asked once when the primary fails
    pub backup_url: Option<String>,
    /// Requested TSA policy OID, dotted form
    pub policy: Option<String>,
    /// Timeout for each request
    pub timeout: Duration,
}

impl TimestampConfig {
    /// Configuration for a single authority
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backup_url: None,
            policy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the backup authority
    pub fn with_backup(mut self, url: impl Into<String>) -> Self {
        self.backup_url = Some(url.into());
        self
    }

    /// Request a policy OID
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A client obtaining verified timestamps from a Time-Stamp Authority
#[derive(Debug, Clone)]
pub struct TimestampClient {
    config: TimestampConfig,
    policy: Option<ObjectIdentifier>,
    transport: Arc<dyn HttpTransport>,
    trust: Arc<TrustListStore>,
}

impl TimestampClient {
    /// Create a client using a reqwest transport
    pub fn new(config: TimestampConfig, trust: Arc<TrustListStore>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport, trust)
    }

    /// Create a client with an explicit transport
    pub fn with_transport(
        config: TimestampConfig,
        transport: Arc<dyn HttpTransport>,
        trust: Arc<TrustListStore>,
    ) -> Result<Self> {
        let policy = config
            .policy
            .as_deref()
            .map(|oid| {
                ObjectIdentifier::from_str(oid)
                    .map_err(|e| Error::Configuration(format!("invalid policy {}: {}", oid, e)))
            })
            .transpose()?;

        Ok(Self {
            config,
            policy,
            transport,
            trust,
        })
    }

    /// The client configuration
    pub fn config(&self) -> &TimestampConfig {
        &self.config
    }

    /// Obtain and verify a timestamp over the exact `payload` bytes
    ///
    /// If the primary authority cannot deliver a granted response, the backup
    /// authority is asked once with a fresh nonce. Verification failures are
    /// never retried.
    pub fn timestamp(&self, payload: &[u8]) -> Result<TimestampToken> {
        let digest = qsign_crypto::sha256(payload);

        let (response, nonce) = match self.acquire(&self.config.url, &digest) {
            Ok(acquired) => acquired,
            Err(e) if e.is_retryable() => match &self.config.backup_url {
                Some(backup) => {
                    tracing::warn!(
                        "Timestamp from {} failed ({}), retrying with {}",
                        self.config.url,
                        e,
                        backup
                    );
                    self.acquire(backup, &digest)?
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let anchors = self.trust.load()?;
        let opts = VerifyOpts::new(&anchors)
            .with_nonce(nonce)
            .with_expected_digest(digest.to_vec());
        verify_timestamp_response(&response, payload, &opts)
    }

    /// Send one request and return the granted response with its nonce
    fn acquire(&self, url: &str, digest: &[u8; 32]) -> Result<(Vec<u8>, Int)> {
        let imprint = Asn1MessageImprint::new(HashAlgorithm::Sha256, digest.to_vec())
            .map_err(|e| Error::Asn1(format!("failed to build message imprint: {}", e)))?;
        let request = TimeStampReq::new(imprint)
            .map_err(|e| Error::Asn1(format!("failed to build request: {}", e)))?
            .with_policy(self.policy);
        let nonce = request
            .nonce
            .clone()
            .ok_or_else(|| Error::Asn1("request has no nonce".to_string()))?;
        let request_der = request
            .to_der()
            .map_err(|e| Error::Asn1(format!("failed to encode request: {}", e)))?;

        tracing::debug!("Requesting timestamp from {}", url);
        let body = self
            .transport
            .post(url, TIMESTAMP_QUERY_CONTENT_TYPE, request_der, self.config.timeout)?
            .into_success_body(url)?;

        let response = TimeStampResp::from_der_bytes(&body).map_err(|e| {
            Error::InvalidResponse(format!("undecodable response from {}: {}", url, e))
        })?;
        if !response.is_success() {
            return Err(Error::InvalidResponse(format!(
                "{} did not grant the request: {:?}",
                url,
                response.status.status_enum()
            )));
        }

        Ok((body, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = TimestampConfig::new("https://tsa.example/tsr")
            .with_backup("https://backup.example/tsr")
            .with_policy("1.2.3.4")
            .with_timeout(Duration::from_secs(3));

        assert_eq!(config.url, "https://tsa.example/tsr");
        assert_eq!(config.backup_url.as_deref(), Some("https://backup.example/tsr"));
        assert_eq!(config.policy.as_deref(), Some("1.2.3.4"));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }
}
