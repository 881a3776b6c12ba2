//! File system based cache implementation

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{default_cache_dir, CacheAdapter, CacheEntry, CacheKey, Result};

/// On-disk record: the value and its metadata in one file
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    /// When the cache entry was stored
    stored_at: DateTime<Utc>,
    /// The cached bytes, base64
    data: String,
}

/// File system based cache
///
/// Each cache key maps to one JSON record. Writers serialize on an advisory
/// lock held on a sibling `.lock` file and replace the record by renaming a
/// fully written temporary file over it, so concurrent readers (in this or
/// another process) always see either the previous or the new record.
///
/// # Directory Structure
///
/// ```text
/// cache_dir/
/// ├── trust_list.json
/// └── trust_list.lock
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemCache {
    /// Base directory for cache files
    cache_dir: PathBuf,
}

impl FileSystemCache {
    /// Create a new file system cache at the specified directory
    ///
    /// The directory will be created if it doesn't exist when writing.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        })
    }

    /// Create a cache at the default platform-specific location
    ///
    /// See [`default_cache_dir`] for the exact locations.
    pub fn default_location() -> Result<Self> {
        Self::new(default_cache_dir()?)
    }

    /// The directory holding cache files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.as_str()))
    }

    fn lock_path(&self, key: CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.lock", key.as_str()))
    }

    /// Run `f` while holding the exclusive lock for `key`
    fn with_lock<T>(&self, key: CacheKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        fs::create_dir_all(&self.cache_dir)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(key))?;
        lock.lock_exclusive()?;

        let result = f();

        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!("Failed to release cache lock for {}: {}", key.as_str(), e);
        }
        result
    }
}

impl CacheAdapter for FileSystemCache {
    fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>> {
        let content = match fs::read(self.cache_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: CacheRecord = serde_json::from_slice(&content)?;
        Ok(Some(CacheEntry {
            data: STANDARD.decode(record.data)?,
            stored_at: record.stored_at,
        }))
    }

    fn set(&self, key: CacheKey, value: &[u8], stored_at: DateTime<Utc>) -> Result<()> {
        let record = CacheRecord {
            stored_at,
            data: STANDARD.encode(value),
        };
        let json = serde_json::to_vec(&record)?;

        self.with_lock(key, || {
            let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(self.cache_path(key))?;
            tracing::debug!(
                "Stored {} bytes under {} in {}",
                value.len(),
                key.as_str(),
                self.cache_dir.display()
            );
            Ok(())
        })
    }

    fn remove(&self, key: CacheKey) -> Result<()> {
        self.with_lock(key, || {
            match fs::remove_file(self.cache_path(key)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn clear(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let _ = fs::remove_file(&path);
            }
        }

        Ok(())
    }
}
