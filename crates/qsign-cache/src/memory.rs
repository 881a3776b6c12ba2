//! In-memory cache implementation

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::{CacheAdapter, CacheEntry, CacheKey, Result};

/// In-memory cache
///
/// Stores values in process memory. It's fast but not persistent across
/// process restarts. Clones share the same storage.
///
/// # Example
///
/// ```
/// use qsign_cache::{CacheAdapter, CacheKey, InMemoryCache};
///
/// # fn example() -> Result<(), qsign_cache::Error> {
/// let cache = InMemoryCache::new();
/// cache.set(CacheKey::TrustList, b"anchors", chrono::Utc::now())?;
/// assert!(cache.get(CacheKey::TrustList)?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheAdapter for InMemoryCache {
    fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: CacheKey, value: &[u8], stored_at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                data: value.to_vec(),
                stored_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = InMemoryCache::new();
        let key = CacheKey::TrustList;
        let now = Utc::now();

        assert!(cache.get(key).unwrap().is_none());

        cache.set(key, b"test-data", now).unwrap();
        let entry = cache.get(key).unwrap().unwrap();
        assert_eq!(entry.data, b"test-data");
        assert_eq!(entry.stored_at, now);

        cache.remove(key).unwrap();
        assert!(cache.get(key).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache_clones_share_storage() {
        let cache = InMemoryCache::new();
        let clone = cache.clone();

        clone.set(CacheKey::TrustList, b"shared", Utc::now()).unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear().unwrap();
        assert!(clone.is_empty());
    }
}
