//! Cache support for qsign trust material
//!
//! This crate provides a pluggable, synchronous caching mechanism. Entries
//! never expire on their own: each one records when it was stored and the
//! caller decides whether it is fresh enough, which lets a stale entry serve
//! as the last resort when a refresh fails.
//!
//! - [`FileSystemCache`]: Persistent cache stored on disk, shared between processes
//! - [`InMemoryCache`]: In-process cache, mostly for tests
//!
//! # Example
//!
//! ```no_run
//! use qsign_cache::{CacheAdapter, CacheKey, FileSystemCache};
//!
//! # fn example() -> Result<(), qsign_cache::Error> {
//! let cache = FileSystemCache::default_location()?;
//! cache.set(CacheKey::TrustList, b"{}", chrono::Utc::now())?;
//!
//! if let Some(entry) = cache.get(CacheKey::TrustList)? {
//!     if entry.is_fresh(chrono::Utc::now(), CacheKey::TrustList.default_ttl()) {
//!         println!("fresh: {} bytes", entry.data.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod filesystem;
mod memory;

pub use error::{Error, Result};
pub use filesystem::FileSystemCache;
pub use memory::InMemoryCache;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Cache keys for the resources qsign persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Merged trust anchor set built from the federated trust lists
    TrustList,
}

impl CacheKey {
    /// Get the string representation used for file names
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::TrustList => "trust_list",
        }
    }

    /// Get the recommended freshness window for this cache key
    pub fn default_ttl(&self) -> Duration {
        match self {
            CacheKey::TrustList => Duration::days(7),
        }
    }
}

/// A cached value and the time it was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cached data
    pub data: Vec<u8>,
    /// When the value was stored
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    /// Whether the entry is younger than `window` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) < window
    }
}

/// Trait for cache adapters
///
/// Implementations can provide different storage backends (filesystem,
/// memory, etc.) while maintaining the same API.
pub trait CacheAdapter: Send + Sync + std::fmt::Debug {
    /// Get a cached value by key
    ///
    /// Returns `Ok(Some(entry))` whatever its age, `Ok(None)` if the key
    /// doesn't exist, or `Err(...)` on I/O or decoding errors.
    fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>>;

    /// Store a value, replacing any previous one atomically
    fn set(&self, key: CacheKey, value: &[u8], stored_at: DateTime<Utc>) -> Result<()>;

    /// Remove a cached value
    fn remove(&self, key: CacheKey) -> Result<()>;

    /// Clear all cached values
    fn clear(&self) -> Result<()>;
}

impl<T: CacheAdapter + ?Sized> CacheAdapter for Arc<T> {
    fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn set(&self, key: CacheKey, value: &[u8], stored_at: DateTime<Utc>) -> Result<()> {
        (**self).set(key, value, stored_at)
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

impl CacheAdapter for Box<dyn CacheAdapter> {
    fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn set(&self, key: CacheKey, value: &[u8], stored_at: DateTime<Utc>) -> Result<()> {
        (**self).set(key, value, stored_at)
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Get the default cache directory for qsign
///
/// This returns the platform-specific cache directory:
/// - Linux: `~/.cache/qsign/`
/// - macOS: `~/Library/Caches/eu.qsign.qsign/`
/// - Windows: `C:\Users\<User>\AppData\Local\qsign\qsign\cache\`
pub fn default_cache_dir() -> Result<std::path::PathBuf> {
    let project_dirs = directories::ProjectDirs::from("eu", "qsign", "qsign")
        .ok_or_else(|| Error::Io("Could not determine cache directory".into()))?;
    Ok(project_dirs.cache_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cache_key_as_str() {
        assert_eq!(CacheKey::TrustList.as_str(), "trust_list");
        assert_eq!(CacheKey::TrustList.default_ttl(), Duration::days(7));
    }

    #[test]
    fn test_entry_freshness() {
        let stored_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let entry = CacheEntry {
            data: vec![],
            stored_at,
        };
        let window = Duration::days(7);

        assert!(entry.is_fresh(stored_at + Duration::days(6), window));
        assert!(!entry.is_fresh(stored_at + Duration::days(7), window));
        assert_eq!(entry.age(stored_at + Duration::hours(5)), Duration::hours(5));
    }
}
