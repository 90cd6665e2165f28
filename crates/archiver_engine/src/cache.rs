use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use archiver_core::{normalize_link, CleanContent};
use archiver_logging::{archiver_debug, archiver_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filename::short_hash;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),
    #[error("cache entry could not be encoded: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Deterministic cache key: SHA-256 hex of the normalized link.
pub fn cache_key(link: &str) -> String {
    short_hash(&normalize_link(link), 32)
}

/// On-disk record. Entries are replaced or evicted, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub link: String,
    pub created_utc: DateTime<Utc>,
    pub payload: CleanContent,
}

/// Sanitized post content keyed by normalized link, shared by all fetch workers.
///
/// Every write names the generation the fetch started under; a write from an
/// older generation than the current one is dropped so `clear` is never
/// undone by fetches that were already in flight.
pub trait ContentCache: Send + Sync {
    fn get(&self, link: &str) -> Option<CleanContent>;
    fn put(&self, link: &str, content: &CleanContent, generation: u64);
    fn generation(&self) -> u64;
    /// Remove every entry; returns how many were removed.
    fn clear(&self) -> Result<usize, CacheError>;
}

/// Used when caching is disabled.
#[derive(Debug, Default)]
pub struct NoCache;

impl ContentCache for NoCache {
    fn get(&self, _link: &str) -> Option<CleanContent> {
        None
    }

    fn put(&self, _link: &str, _content: &CleanContent, _generation: u64) {}

    fn generation(&self) -> u64 {
        0
    }

    fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// One JSON file per entry: `{dir}/{key}.json`.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    generation: AtomicU64,
    writer: AtomicFileWriter,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            generation: AtomicU64::new(0),
            writer: AtomicFileWriter,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, link: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(link)))
    }

    fn read_entry(&self, link: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(link);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if entry.key != cache_key(link) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn write_entry(&self, link: &str, content: &CleanContent) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: cache_key(link),
            link: link.to_string(),
            created_utc: Utc::now(),
            payload: content.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.writer.write_bytes(&self.entry_path(link), &bytes)?;
        Ok(())
    }
}

impl ContentCache for DiskCache {
    fn get(&self, link: &str) -> Option<CleanContent> {
        match self.read_entry(link) {
            Ok(entry) => entry.map(|e| e.payload),
            Err(err) => {
                archiver_warn!("Cache read failed for {link}, treating as miss: {err}");
                None
            }
        }
    }

    fn put(&self, link: &str, content: &CleanContent, generation: u64) {
        let current = self.generation();
        if generation != current {
            archiver_debug!(
                "Discarding cache write for {link}: started in generation {generation}, now {current}"
            );
            return;
        }
        if let Err(err) = self.write_entry(link, content) {
            archiver_warn!("Cache write failed for {link}: {err}");
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        archiver_debug!("Cleared {removed} cache entries from {}", self.dir.display());
        Ok(removed)
    }
}
