//! Engine configuration
//!
//! [`SigningConfig`] is deserialized from JSON and converted into the
//! component configurations when the engine is built.

use crate::error::{Error, Result};
use qsign_ocsp::OcspConfig;
use qsign_trust_list::{TrustListConfig, DEFAULT_LOTL_URL};
use qsign_tsa::TimestampConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the signing key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentityConfig {
    /// Key and certificates on disk, PEM or DER
    Files {
        /// Private key (PKCS#8, PKCS#1 or SEC1)
        key: PathBuf,
        /// Signing certificate
        certificate: PathBuf,
        /// Issuing CA certificate, enables revocation checks
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer: Option<PathBuf>,
    },
    /// Ephemeral key generated at startup
    Development,
}

/// Timestamp authority settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampSettings {
    /// Primary TSA endpoint
    pub url: String,
    /// TSA asked once when the primary fails
    pub backup_url: Option<String>,
    /// Requested policy OID
    pub policy: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TimestampSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            backup_url: None,
            policy: None,
            timeout_secs: 30,
        }
    }
}

/// Revocation checking settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcspSettings {
    /// Ask the responder when an issuer certificate is configured
    pub enabled: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Accept `http` responder URLs
    pub allow_insecure_http: bool,
    /// Responder used instead of the certificate's AIA location
    pub responder_url: Option<String>,
}

impl Default for OcspSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
            allow_insecure_http: false,
            responder_url: None,
        }
    }
}

/// Trust list settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustListSettings {
    /// List of trusted lists location
    pub lotl_url: String,
    /// Cache directory; the platform default when unset
    pub cache_dir: Option<PathBuf>,
    /// Keep anchors in memory only
    pub disable_cache: bool,
    /// Days a fetched anchor set is used before refreshing
    pub freshness_days: i64,
    /// Download timeout in seconds
    pub timeout_secs: u64,
    /// Accept `http` trusted list locations
    pub allow_insecure_http: bool,
    /// PEM bundle replacing the embedded fallback anchors
    pub fallback_pem_file: Option<PathBuf>,
}

impl Default for TrustListSettings {
    fn default() -> Self {
        Self {
            lotl_url: DEFAULT_LOTL_URL.to_string(),
            cache_dir: None,
            disable_cache: false,
            freshness_days: 7,
            timeout_secs: 30,
            allow_insecure_http: false,
            fallback_pem_file: None,
        }
    }
}

/// Configuration of a [`SignatureEngine`](crate::SignatureEngine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Key material; required outside development mode
    pub identity: Option<IdentityConfig>,
    /// Second switch required for [`IdentityConfig::Development`]
    pub allow_development_identity: bool,
    /// Timestamp authority
    pub timestamp: TimestampSettings,
    /// Revocation checking
    pub ocsp: OcspSettings,
    /// Trust anchors
    pub trust_list: TrustListSettings,
}

impl SigningConfig {
    /// Defaults for the official EU trust lists; a TSA and key material
    /// still have to be configured
    pub fn production() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {}", e)))
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Sign with key material from files
    pub fn with_identity_files(
        mut self,
        key: impl Into<PathBuf>,
        certificate: impl Into<PathBuf>,
        issuer: Option<PathBuf>,
    ) -> Self {
        self.identity = Some(IdentityConfig::Files {
            key: key.into(),
            certificate: certificate.into(),
            issuer,
        });
        self
    }

    /// Sign with an ephemeral development key
    pub fn with_development_identity(mut self) -> Self {
        self.identity = Some(IdentityConfig::Development);
        self.allow_development_identity = true;
        self
    }

    /// Set the primary TSA
    pub fn with_tsa_url(mut self, url: impl Into<String>) -> Self {
        self.timestamp.url = url.into();
        self
    }

    /// Set the backup TSA
    pub fn with_backup_tsa_url(mut self, url: impl Into<String>) -> Self {
        self.timestamp.backup_url = Some(url.into());
        self
    }

    /// Set the list of trusted lists location
    pub fn with_lotl_url(mut self, url: impl Into<String>) -> Self {
        self.trust_list.lotl_url = url.into();
        self
    }

    /// Use `dir` for the trust list cache
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trust_list.cache_dir = Some(dir.into());
        self
    }

    /// Keep trust anchors in memory only
    pub fn without_cache(mut self) -> Self {
        self.trust_list.disable_cache = true;
        self
    }

    /// Enable or disable revocation checks
    pub fn with_ocsp(mut self, enabled: bool) -> Self {
        self.ocsp.enabled = enabled;
        self
    }

    /// Check the settings that can be checked without touching the network
    pub fn validate(&self) -> Result<()> {
        match &self.identity {
            None => {
                return Err(Error::Configuration(
                    "no signing identity configured".to_string(),
                ))
            }
            Some(IdentityConfig::Development) if !self.allow_development_identity => {
                return Err(Error::Configuration(
                    "development identity requires allow_development_identity".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.timestamp.url.trim().is_empty() {
            return Err(Error::Configuration(
                "no timestamp authority configured".to_string(),
            ));
        }
        if self.trust_list.freshness_days <= 0 {
            return Err(Error::Configuration(format!(
                "trust list freshness must be positive, got {} days",
                self.trust_list.freshness_days
            )));
        }
        Ok(())
    }

    /// Timestamp client configuration
    pub fn timestamp_config(&self) -> TimestampConfig {
        let mut config = TimestampConfig::new(self.timestamp.url.clone())
            .with_timeout(Duration::from_secs(self.timestamp.timeout_secs));
        if let Some(backup) = &self.timestamp.backup_url {
            config = config.with_backup(backup.clone());
        }
        if let Some(policy) = &self.timestamp.policy {
            config = config.with_policy(policy.clone());
        }
        config
    }

    /// Revocation checker configuration, `None` when disabled
    pub fn ocsp_config(&self) -> Option<OcspConfig> {
        if !self.ocsp.enabled {
            return None;
        }
        let mut config = OcspConfig::default()
            .with_timeout(Duration::from_secs(self.ocsp.timeout_secs))
            .allow_insecure_http(self.ocsp.allow_insecure_http);
        if let Some(url) = &self.ocsp.responder_url {
            config = config.with_responder_url(url.clone());
        }
        Some(config)
    }

    /// Trust list store configuration
    ///
    /// Reads the fallback PEM bundle if one is configured.
    pub fn trust_list_config(&self) -> Result<TrustListConfig> {
        let settings = &self.trust_list;
        let mut config = TrustListConfig::default()
            .with_lotl_url(settings.lotl_url.clone())
            .with_freshness(chrono::Duration::days(settings.freshness_days))
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .allow_insecure_http(settings.allow_insecure_http);
        if settings.disable_cache {
            config = config.without_cache();
        }
        if let Some(dir) = &settings.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        if let Some(path) = &settings.fallback_pem_file {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                Error::Configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
            config = config.with_fallback_pem(pem);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_json_configuration() {
        let config = SigningConfig::from_json(
            r#"{
                "identity": {
                    "mode": "files",
                    "key": "/etc/qsign/key.pem",
                    "certificate": "/etc/qsign/cert.pem",
                    "issuer": "/etc/qsign/ca.pem"
                },
                "timestamp": {
                    "url": "https://tsa.example/tsr",
                    "backup_url": "https://tsa2.example/tsr"
                },
                "ocsp": { "timeout_secs": 3 },
                "trust_list": { "disable_cache": true }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.identity,
            Some(IdentityConfig::Files {
                key: "/etc/qsign/key.pem".into(),
                certificate: "/etc/qsign/cert.pem".into(),
                issuer: Some("/etc/qsign/ca.pem".into()),
            })
        );
        assert!(config.ocsp.enabled);
        assert_eq!(config.ocsp.timeout_secs, 3);
        assert_eq!(config.trust_list.lotl_url, DEFAULT_LOTL_URL);
        assert!(config.validate().is_ok());

        let tsa = config.timestamp_config();
        assert_eq!(tsa.backup_url.as_deref(), Some("https://tsa2.example/tsr"));
        assert!(config.trust_list_config().unwrap().disable_cache);
        assert_eq!(
            config.ocsp_config().unwrap().timeout,
            Duration::from_secs(3)
        );
    }

    #[rstest]
    #[case::no_identity(SigningConfig::default().with_tsa_url("https://tsa.example"))]
    #[case::no_tsa(SigningConfig::default().with_development_identity())]
    #[case::development_not_allowed(SigningConfig {
        identity: Some(IdentityConfig::Development),
        ..SigningConfig::default().with_tsa_url("https://tsa.example")
    })]
    fn test_invalid_configuration(#[case] config: SigningConfig) {
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_disabled_ocsp_has_no_config() {
        assert!(SigningConfig::default()
            .with_ocsp(false)
            .ocsp_config()
            .is_none());
    }

    #[test]
    fn test_unknown_identity_mode_is_rejected() {
        let err = SigningConfig::from_json(r#"{"identity": {"mode": "hsm"}}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
