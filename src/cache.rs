//! Score cache keyed by metric identity and corpus fingerprint.
//!
//! Entries live in memory and, when a cache directory is configured, as JSON
//! files under `<dir>/<metric>/<sha256>.json`. A corrupt or unreadable disk
//! entry is treated as a miss.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to serialize cache entry: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Default persistent location: `<user cache dir>/mt-pairwise-eval`
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mt-pairwise-eval")
}

/// Two-level (memory, optional disk) cache of computed scores
#[derive(Debug)]
pub struct ScoreCache<V> {
    entries: Mutex<HashMap<(String, String), V>>,
    dir: Option<PathBuf>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V> Default for ScoreCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dir: None,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }
}

impl<V> ScoreCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Memory-only cache
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache that also persists entries under `dir`
    #[must_use]
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Persistent directory, if any
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look up an entry, falling back to disk
    pub fn get(&self, metric: &str, fingerprint: &str) -> Option<V> {
        let key = (metric.to_string(), fingerprint.to_string());
        if let Some(value) = self.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(metric, "Score cache hit (memory)");
            return Some(value);
        }

        if let Some(value) = self.read_disk(metric, fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(metric, "Score cache hit (disk)");
            self.lock().insert(key, value.clone());
            return Some(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an entry in memory and, if configured, on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the disk entry cannot be written. The in-memory
    /// entry is stored regardless.
    pub fn insert(&self, metric: &str, fingerprint: &str, value: V) -> Result<(), CacheError> {
        let disk = self.dir.as_ref().map(|_| serde_json::to_vec(&value));
        self.lock()
            .insert((metric.to_string(), fingerprint.to_string()), value);

        if let (Some(bytes), Some(path)) = (disk, self.entry_path(metric, fingerprint)) {
            let bytes = bytes?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)?;
        }
        Ok(())
    }

    /// Drop every entry for one metric, in memory and on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the metric's cache directory cannot be removed.
    pub fn invalidate(&self, metric: &str) -> Result<(), CacheError> {
        self.lock().retain(|(m, _), _| m != metric);
        if let Some(dir) = &self.dir {
            let metric_dir = dir.join(metric_dir_name(metric));
            if metric_dir.exists() {
                fs::remove_dir_all(metric_dir)?;
            }
        }
        tracing::info!(metric, "Score cache invalidated");
        Ok(())
    }

    /// Drop every in-memory entry; disk entries are kept
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of in-memory entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing is cached in memory
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Hit and miss counts since creation
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_path(&self, metric: &str, fingerprint: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            dir.join(metric_dir_name(metric))
                .join(format!("{}.json", entry_key(metric, fingerprint)))
        })
    }

    fn read_disk(&self, metric: &str, fingerprint: &str) -> Option<V> {
        let path = self.entry_path(metric, fingerprint)?;
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }
}

/// SHA256 of metric name and corpus fingerprint
#[must_use]
pub fn entry_key(metric: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metric.as_bytes());
    hasher.update([0u8]);
    hasher.update(fingerprint.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn metric_dir_name(metric: &str) -> String {
    metric
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
