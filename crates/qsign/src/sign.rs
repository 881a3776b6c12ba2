//! High-level signing API
//!
//! This module provides [`SignatureEngine`], which turns content plus caller
//! metadata into a timestamped [`SignaturePackage`].

use crate::config::{IdentityConfig, SigningConfig};
use crate::error::{Error, Result};
use crate::identity::SigningIdentity;
use crate::payload::SignaturePayload;
use chrono::{DateTime, SubsecRound, Utc};
use qsign_cache::{CacheAdapter, FileSystemCache, InMemoryCache};
use qsign_crypto::{CertificateInfo, SigningScheme};
use qsign_ocsp::{RevocationChecker, RevocationEvidence, RevocationStatus};
use qsign_transport::{HttpTransport, ReqwestTransport};
use qsign_trust_list::{TrustListConfig, TrustListStore};
use qsign_tsa::{TimestampClient, TimestampToken};
use qsign_types::{
    Clock, HashAlgorithm, MigrationPlan, Sha256Hash, SignatureFormat, SignaturePackage,
    SystemClock,
};
use serde::Serialize;
use std::sync::Arc;

/// Produces one immutable [`SignaturePackage`] per filing
///
/// The engine owns its identity; the timestamp client and revocation checker
/// share a [`TrustListStore`] through `Arc`.
#[derive(Debug)]
pub struct SignatureEngine {
    identity: SigningIdentity,
    timestamp_client: TimestampClient,
    revocation_checker: Option<RevocationChecker>,
    clock: Arc<dyn Clock>,
}

impl SignatureEngine {
    /// Assemble an engine from its collaborators
    pub fn new(
        identity: SigningIdentity,
        timestamp_client: TimestampClient,
        revocation_checker: Option<RevocationChecker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity,
            timestamp_client,
            revocation_checker,
            clock,
        }
    }

    /// Build an engine talking to the configured endpoints over HTTPS
    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::from_config_with(config, transport, Arc::new(SystemClock))
    }

    /// Build an engine from configuration with an explicit transport and clock
    pub fn from_config_with(
        config: &SigningConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let identity = load_identity(config)?;

        let trust_config = config.trust_list_config()?;
        let cache = open_cache(&trust_config)?;
        let trust = Arc::new(TrustListStore::with_parts(
            trust_config,
            cache,
            transport.clone(),
            clock.clone(),
        ));

        let timestamp_client = TimestampClient::with_transport(
            config.timestamp_config(),
            transport.clone(),
            trust.clone(),
        )?;
        let revocation_checker = config.ocsp_config().map(|ocsp| {
            RevocationChecker::with_parts(ocsp, transport.clone(), trust.clone(), clock.clone())
        });

        Ok(Self::new(
            identity,
            timestamp_client,
            revocation_checker,
            clock,
        ))
    }

    /// The signing identity
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Subject, issuer, serial, validity and qualified status of the signing
    /// certificate; `None` in development mode
    pub fn certificate_info(&self) -> Option<CertificateInfo> {
        self.identity.certificate_info()
    }

    /// Sign `content` together with `metadata`
    ///
    /// The timestamp covers the exact canonical payload bytes that were
    /// signed. Revocation evidence is best effort; without it the package is
    /// Baseline-T.
    pub fn sign<M: Serialize + ?Sized>(
        &self,
        content: &[u8],
        metadata: &M,
    ) -> Result<SignaturePackage> {
        let certificate_id = self.identity.certificate_id()?;
        tracing::debug!("Signing {} bytes as {}", content.len(), certificate_id);

        let package = PayloadBuilt::new(content, metadata, self.clock.now(), certificate_id)?
            .sign(&self.identity)?
            .timestamp(&self.timestamp_client)?
            .check_revocation(self.revocation_checker.as_ref(), &self.identity)?
            .package(&self.identity);

        tracing::info!(
            "Produced {} package signed with {}",
            package.signature_format,
            package.algorithm
        );
        Ok(package)
    }
}

fn load_identity(config: &SigningConfig) -> Result<SigningIdentity> {
    match &config.identity {
        Some(IdentityConfig::Files {
            key,
            certificate,
            issuer,
        }) => SigningIdentity::from_files(key, certificate, issuer.as_deref()),
        Some(IdentityConfig::Development) if config.allow_development_identity => {
            SigningIdentity::ephemeral()
        }
        Some(IdentityConfig::Development) => Err(Error::Configuration(
            "development identity requires allow_development_identity".to_string(),
        )),
        None => Err(Error::Configuration(
            "no signing identity configured".to_string(),
        )),
    }
}

fn open_cache(config: &TrustListConfig) -> Result<Arc<dyn CacheAdapter>> {
    if config.disable_cache {
        return Ok(Arc::new(InMemoryCache::new()));
    }
    let cache = match &config.cache_dir {
        Some(dir) => FileSystemCache::new(dir)?,
        None => FileSystemCache::default_location()?,
    };
    Ok(Arc::new(cache))
}

// Each stage consumes the previous one.

struct PayloadBuilt {
    bytes: Vec<u8>,
    content_hash: Sha256Hash,
    signing_time: DateTime<Utc>,
    certificate_id: String,
}

struct Signed {
    payload: PayloadBuilt,
    scheme: SigningScheme,
    signature: Vec<u8>,
}

struct Timestamped {
    signed: Signed,
    token: TimestampToken,
}

struct RevocationChecked {
    timestamped: Timestamped,
    evidence: Option<RevocationEvidence>,
}

impl PayloadBuilt {
    fn new<M: Serialize + ?Sized>(
        content: &[u8],
        metadata: &M,
        now: DateTime<Utc>,
        certificate_id: String,
    ) -> Result<Self> {
        let signing_time = now.trunc_subsecs(0);
        let content_hash = Sha256Hash::from_bytes(qsign_crypto::sha256(content));
        let payload = SignaturePayload::from_parts(
            &content_hash,
            metadata,
            signing_time,
            certificate_id.clone(),
        )?;

        Ok(Self {
            bytes: payload.to_canonical_bytes()?,
            content_hash,
            signing_time,
            certificate_id,
        })
    }

    fn sign(self, identity: &SigningIdentity) -> Result<Signed> {
        let scheme = identity.scheme();
        let signature = identity
            .key()
            .sign_with_scheme(&self.bytes, scheme)
            .map_err(|e| Error::Configuration(format!("signing failed: {}", e)))?;

        Ok(Signed {
            payload: self,
            scheme,
            signature: signature.into_bytes(),
        })
    }
}

impl Signed {
    fn timestamp(self, client: &TimestampClient) -> Result<Timestamped> {
        let token = client.timestamp(&self.payload.bytes)?;

        let expected = qsign_crypto::sha256(&self.payload.bytes);
        if token.message_imprint.algorithm != HashAlgorithm::Sha256
            || token.message_imprint.digest != expected
        {
            tracing::error!("Timestamp does not cover the signed payload");
            return Err(Error::ProtocolViolation(
                "timestamp message imprint does not match the signed payload".to_string(),
            ));
        }

        Ok(Timestamped {
            signed: self,
            token,
        })
    }
}

impl Timestamped {
    fn check_revocation(
        self,
        checker: Option<&RevocationChecker>,
        identity: &SigningIdentity,
    ) -> Result<RevocationChecked> {
        let evidence = match (checker, identity.certificate(), identity.issuer()) {
            (Some(checker), Some(certificate), Some(issuer)) => {
                checker.check(certificate, issuer)
            }
            _ => None,
        };

        let evidence = match evidence {
            Some(evidence) if evidence.is_good() => Some(evidence),
            Some(RevocationEvidence {
                status: RevocationStatus::Revoked { revoked_at, reason },
                ..
            }) => {
                tracing::error!("Signing certificate revoked at {}", revoked_at);
                return Err(Error::Configuration(format!(
                    "signing certificate was revoked at {} ({})",
                    revoked_at,
                    reason.as_deref().unwrap_or("no reason given")
                )));
            }
            Some(_) => {
                tracing::warn!("Responder does not know the signing certificate");
                None
            }
            None => None,
        };

        Ok(RevocationChecked {
            timestamped: self,
            evidence,
        })
    }
}

impl RevocationChecked {
    fn package(self, identity: &SigningIdentity) -> SignaturePackage {
        let Timestamped { signed, token } = self.timestamped;
        let ocsp_response = self.evidence.map(|evidence| evidence.response);

        SignaturePackage {
            algorithm: signed.scheme.name().to_string(),
            signature: signed.signature,
            content_hash: signed.payload.content_hash,
            signing_time: signed.payload.signing_time,
            certificate_id: signed.payload.certificate_id,
            certificate_chain: identity.certificate_chain(),
            signature_format: SignatureFormat::for_evidence(ocsp_response.is_some()),
            timestamp_token: token.token,
            timestamp_message_imprint: token.message_imprint.digest,
            ocsp_response,
            quantum_ready: signed.scheme.is_quantum_resistant(),
            migration_plan: MigrationPlan::advisory(),
        }
    }
}
