//! Trust list store: federated fetching, caching and fallback
//!
//! The store keeps one merged [`TrustAnchorSet`] built from the EU list of
//! trusted lists and the national lists it points to. The set is persisted
//! through a [`CacheAdapter`] and served from memory while it is younger than
//! the freshness window.

use crate::anchors::{TrustAnchor, TrustAnchorSet};
use crate::error::{Error, Result};
use crate::fallback::{self, BUILTIN_SOURCE};
use crate::tsl::{self, TslPointer};
use chrono::{DateTime, Utc};
use qsign_cache::{CacheAdapter, CacheKey, FileSystemCache, InMemoryCache};
use qsign_transport::{HttpTransport, ReqwestTransport};
use qsign_types::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use url::Url;

/// Default location of the EU list of trusted lists
pub const DEFAULT_LOTL_URL: &str = "https://ec.europa.eu/tools/lotl/eu-lotl.xml";

/// Default timeout for each trust list download
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Seconds a stale or fallback set is served before the network is tried again
pub const DEGRADED_RETRY_SECS: i64 = 300;

/// Configuration for a [`TrustListStore`]
#[derive(Debug, Clone)]
pub struct TrustListConfig {
    /// URL of the list of trusted lists
    pub lotl_url: String,
    /// Cache directory; the platform default when `None`
    pub cache_dir: Option<PathBuf>,
    /// Keep the anchor set in memory only
    pub disable_cache: bool,
    /// How long a fetched anchor set is used before refreshing
    pub freshness: chrono::Duration,
    /// Timeout for each download
    pub timeout: Duration,
    /// Accept `http` trusted list locations
    pub allow_insecure_http: bool,
    /// PEM bundle replacing the embedded fallback anchors
    pub fallback_pem: Option<String>,
}

impl Default for TrustListConfig {
    fn default() -> Self {
        Self {
            lotl_url: DEFAULT_LOTL_URL.to_string(),
            cache_dir: None,
            disable_cache: false,
            freshness: CacheKey::TrustList.default_ttl(),
            timeout: DEFAULT_TIMEOUT,
            allow_insecure_http: false,
            fallback_pem: None,
        }
    }
}

impl TrustListConfig {
    /// Configuration for the official EU lists
    pub fn production() -> Self {
        Self::default()
    }

    /// Set the list of trusted lists URL
    pub fn with_lotl_url(mut self, url: impl Into<String>) -> Self {
        self.lotl_url = url.into();
        self
    }

    /// Set the cache directory
    pub fn with_cache_dir(mut self, path: PathBuf) -> Self {
        self.cache_dir = Some(path);
        self
    }

    /// Disable the on-disk cache
    pub fn without_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    /// Set the freshness window
    pub fn with_freshness(mut self, freshness: chrono::Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Set the download timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept plain `http` list locations
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    /// Replace the embedded fallback anchors
    pub fn with_fallback_pem(mut self, pem: impl Into<String>) -> Self {
        self.fallback_pem = Some(pem.into());
        self
    }
}

/// Persisted form of the merged anchor set
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    last_updated: DateTime<Utc>,
    anchors: TrustAnchorSet,
}

#[derive(Debug, Clone)]
struct Loaded {
    anchors: Arc<TrustAnchorSet>,
    /// `None` for the fallback set, which was never fetched
    last_updated: Option<DateTime<Utc>>,
    valid_until: DateTime<Utc>,
}

/// Service producing the trust anchors used for chain validation
///
/// Shared between the timestamp client and the revocation checker via `Arc`.
#[derive(Debug)]
pub struct TrustListStore {
    config: TrustListConfig,
    cache: Arc<dyn CacheAdapter>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Loaded>>,
    refresh_lock: Mutex<()>,
}

impl TrustListStore {
    /// Create a store with the configured cache, a reqwest transport and the
    /// system clock
    pub fn new(config: TrustListConfig) -> Result<Self> {
        let cache: Arc<dyn CacheAdapter> = if config.disable_cache {
            Arc::new(InMemoryCache::new())
        } else {
            match &config.cache_dir {
                Some(dir) => Arc::new(FileSystemCache::new(dir)?),
                None => Arc::new(FileSystemCache::default_location()?),
            }
        };
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_parts(config, cache, transport, Arc::new(SystemClock)))
    }

    /// Create a store from explicit collaborators
    pub fn with_parts(
        config: TrustListConfig,
        cache: Arc<dyn CacheAdapter>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            cache,
            transport,
            clock,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The store configuration
    pub fn config(&self) -> &TrustListConfig {
        &self.config
    }

    /// When the anchor set currently held in memory was fetched
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read_snapshot().and_then(|loaded| loaded.last_updated)
    }

    /// Drop the in-memory snapshot; the next [`load`](Self::load) consults the
    /// cache again
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Return the current anchor set
    ///
    /// A snapshot younger than the freshness window is returned as is.
    /// Otherwise the lists are fetched again; if that fails entirely the
    /// last cached set is used even when stale, then the fallback anchors.
    /// Either degraded set is kept in memory for [`DEGRADED_RETRY_SECS`]
    /// before the network is tried again.
    pub fn load(&self) -> Result<Arc<TrustAnchorSet>> {
        if let Some(loaded) = self.fresh_snapshot() {
            return Ok(loaded.anchors);
        }

        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another thread may have refreshed while we waited
        if let Some(loaded) = self.fresh_snapshot() {
            return Ok(loaded.anchors);
        }

        let cached = self.read_cache();
        if let Some(loaded) = &cached {
            if self.is_fresh(loaded) {
                tracing::debug!(
                    "Using cached trust anchors ({} anchors)",
                    loaded.anchors.len()
                );
                self.install(loaded.clone());
                return Ok(Arc::clone(&loaded.anchors));
            }
        }

        let refresh_error = match self.refresh_locked() {
            Ok(anchors) => return Ok(anchors),
            Err(e) => e,
        };
        tracing::warn!("Trust list refresh failed: {}", refresh_error);

        let retry_at = self.clock.now() + chrono::Duration::seconds(DEGRADED_RETRY_SECS);

        if let Some(loaded) = cached {
            tracing::warn!(
                "Using stale trust anchors ({} anchors) until {}",
                loaded.anchors.len(),
                retry_at
            );
            let loaded = Loaded {
                valid_until: retry_at,
                ..loaded
            };
            self.install(loaded.clone());
            return Ok(loaded.anchors);
        }

        let fallback = self
            .fallback_anchors()
            .map_err(|e| Error::TrustChain(format!("unusable fallback anchors: {}", e)))?;
        if !fallback.is_empty() {
            tracing::warn!(
                "No cached trust anchors; using {} built-in fallback anchor(s) until {}",
                fallback.len(),
                retry_at
            );
            let loaded = Loaded {
                anchors: Arc::new(fallback),
                last_updated: None,
                valid_until: retry_at,
            };
            self.install(loaded.clone());
            return Ok(loaded.anchors);
        }

        Err(Error::TrustChain(format!(
            "no trust anchors available: refresh failed ({}) and neither a cache nor fallback anchors exist",
            refresh_error
        )))
    }

    /// Fetch the lists from the network now, regardless of freshness
    pub fn refresh(&self) -> Result<Arc<TrustAnchorSet>> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.refresh_locked()
    }

    /// The fallback anchors, from configuration or the embedded bundle
    pub fn fallback_anchors(&self) -> Result<TrustAnchorSet> {
        match &self.config.fallback_pem {
            Some(pem) => fallback::parse_pem_bundle(pem, BUILTIN_SOURCE),
            None => fallback::embedded(),
        }
    }

    fn refresh_locked(&self) -> Result<Arc<TrustAnchorSet>> {
        let mut anchors = self.fetch_from_network()?;
        let now = self.clock.now();

        match self.fallback_anchors() {
            Ok(fallback) => {
                let added = anchors.merge(fallback);
                tracing::debug!("Merged {} fallback anchor(s)", added);
            }
            Err(e) => tracing::warn!("Ignoring unreadable fallback anchors: {}", e),
        }

        let snapshot = Snapshot {
            last_updated: now,
            anchors,
        };
        self.persist(&snapshot);

        let loaded = Loaded {
            anchors: Arc::new(snapshot.anchors),
            last_updated: Some(now),
            valid_until: now + self.config.freshness,
        };
        tracing::info!(
            "Trust anchors refreshed: {} anchor(s)",
            loaded.anchors.len()
        );
        self.install(loaded.clone());
        Ok(loaded.anchors)
    }

    fn fetch_from_network(&self) -> Result<TrustAnchorSet> {
        let lotl_url = self.check_url(&self.config.lotl_url)?;
        tracing::debug!("Fetching list of trusted lists from {}", lotl_url);
        let lotl = self.fetch_xml(&lotl_url)?;
        let pointers = tsl::parse_pointers(&lotl)?;

        let mut anchors = TrustAnchorSet::new();
        for pointer in &pointers {
            if !pointer.is_xml() {
                continue;
            }
            match self.fetch_list(pointer, &lotl_url) {
                Ok(list_anchors) => {
                    anchors.merge(list_anchors);
                }
                Err(e) => tracing::warn!("Skipping trusted list {}: {}", pointer.location, e),
            }
        }

        if anchors.is_empty() {
            return Err(Error::TrustChain(format!(
                "none of the {} trusted list pointer(s) yielded an anchor",
                pointers.len()
            )));
        }
        Ok(anchors)
    }

    fn fetch_list(&self, pointer: &TslPointer, lotl_url: &Url) -> Result<TrustAnchorSet> {
        let url = self.check_url(&pointer.location)?;
        if &url == lotl_url {
            return Ok(TrustAnchorSet::new());
        }

        let xml = self.fetch_xml(&url)?;
        let mut anchors = TrustAnchorSet::new();
        for service in tsl::parse_services(&xml)? {
            if !service.is_active() {
                tracing::debug!("Ignoring inactive service {}", service.name);
                continue;
            }
            for certificate in service.certificates {
                if let Err(e) = qsign_crypto::parse_certificate(&certificate) {
                    tracing::warn!("Skipping certificate of {}: {}", service.name, e);
                    continue;
                }
                anchors.insert(TrustAnchor::new(
                    service.name.clone(),
                    certificate,
                    pointer.location.clone(),
                ));
            }
        }

        tracing::debug!(
            "{} ({}) yielded {} anchor(s)",
            pointer.location,
            pointer.territory.as_deref().unwrap_or("?"),
            anchors.len()
        );
        Ok(anchors)
    }

    fn check_url(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).map_err(|e| Error::Url(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "https" => Ok(url),
            "http" if self.config.allow_insecure_http => Ok(url),
            scheme => Err(Error::Url(format!(
                "refusing {} location {}",
                scheme, raw
            ))),
        }
    }

    fn fetch_xml(&self, url: &Url) -> Result<String> {
        let body = self
            .transport
            .get(url.as_str(), self.config.timeout)?
            .into_success_body(url.as_str())?;
        String::from_utf8(body).map_err(|e| Error::Xml(format!("{} is not UTF-8: {}", url, e)))
    }

    fn read_cache(&self) -> Option<Loaded> {
        let entry = match self.cache.get(CacheKey::TrustList) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read trust list cache: {}", e);
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot>(&entry.data) {
            Ok(snapshot) if !snapshot.anchors.is_empty() => Some(Loaded {
                anchors: Arc::new(snapshot.anchors),
                last_updated: Some(snapshot.last_updated),
                valid_until: snapshot.last_updated + self.config.freshness,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Ignoring undecodable trust list cache: {}", e);
                None
            }
        }
    }

    fn persist(&self, snapshot: &Snapshot) {
        let result = serde_json::to_vec(snapshot)
            .map_err(Error::from)
            .and_then(|bytes| {
                self.cache
                    .set(CacheKey::TrustList, &bytes, snapshot.last_updated)
                    .map_err(Error::from)
            });
        if let Err(e) = result {
            tracing::warn!("Failed to persist trust anchors: {}", e);
        }
    }

    fn is_fresh(&self, loaded: &Loaded) -> bool {
        self.clock.now() < loaded.valid_until
    }

    fn read_snapshot(&self) -> Option<Loaded> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh_snapshot(&self) -> Option<Loaded> {
        self.read_snapshot().filter(|loaded| self.is_fresh(loaded))
    }

    fn install(&self, loaded: Loaded) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsign_transport::HttpResponse;
    use qsign_types::FixedClock;

    #[derive(Debug)]
    struct OfflineTransport;

    impl HttpTransport for OfflineTransport {
        fn get(&self, url: &str, _: Duration) -> qsign_transport::Result<HttpResponse> {
            Err(qsign_transport::Error::Http(format!("{}: offline", url)))
        }

        fn post(
            &self,
            url: &str,
            _: &str,
            _: Vec<u8>,
            _: Duration,
        ) -> qsign_transport::Result<HttpResponse> {
            Err(qsign_transport::Error::Http(format!("{}: offline", url)))
        }
    }

    fn offline_store(config: TrustListConfig) -> TrustListStore {
        TrustListStore::with_parts(
            config,
            Arc::new(InMemoryCache::new()),
            Arc::new(OfflineTransport),
            Arc::new(FixedClock::new(Utc::now())),
        )
    }

    #[test]
    fn test_config_builders() {
        let config = TrustListConfig::production()
            .with_lotl_url("https://lotl.example/lotl.xml")
            .with_freshness(chrono::Duration::days(1))
            .with_timeout(Duration::from_secs(5))
            .allow_insecure_http(true)
            .without_cache();

        assert_eq!(config.lotl_url, "https://lotl.example/lotl.xml");
        assert_eq!(config.freshness, chrono::Duration::days(1));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.allow_insecure_http);
        assert!(config.disable_cache);
        assert_eq!(TrustListConfig::default().lotl_url, DEFAULT_LOTL_URL);
    }

    #[test]
    fn test_rejects_plain_http_by_default() {
        let store = offline_store(TrustListConfig::default());
        assert!(matches!(
            store.check_url("http://tl.example/tl.xml"),
            Err(Error::Url(_))
        ));
        assert!(store.check_url("https://tl.example/tl.xml").is_ok());
        assert!(store.check_url("not a url").is_err());

        let lenient = offline_store(TrustListConfig::default().allow_insecure_http(true));
        assert!(lenient.check_url("http://tl.example/tl.xml").is_ok());
        assert!(lenient.check_url("ftp://tl.example/tl.xml").is_err());
    }

    #[test]
    fn test_offline_without_cache_or_fallback_fails_closed() {
        let store = offline_store(TrustListConfig::default().with_fallback_pem(""));

        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::TrustChain(_)));
        assert!(err.to_string().contains("no trust anchors available"));
        assert!(store.last_updated().is_none());
    }

    #[test]
    fn test_refresh_reports_network_failure() {
        let store = offline_store(TrustListConfig::default());
        assert!(matches!(store.refresh(), Err(Error::Transport(_))));
    }

    #[test]
    fn test_offline_first_run_uses_embedded_anchors() {
        let store = offline_store(TrustListConfig::default());

        let anchors = store.load().unwrap();
        assert_eq!(anchors.len(), fallback::embedded().unwrap().len());
        assert!(anchors.iter().all(|a| a.source == BUILTIN_SOURCE));
        // The fallback set was never fetched
        assert!(store.last_updated().is_none());
    }

    #[test]
    fn test_malformed_fallback_bundle_is_a_trust_chain_error() {
        let store = offline_store(TrustListConfig::default().with_fallback_pem(
            "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
        ));

        assert!(matches!(store.load(), Err(Error::TrustChain(_))));
    }
}
