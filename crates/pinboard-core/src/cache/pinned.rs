//! Version-pinned local cache.
//!
//! Entries are keyed by `<pin>/<version>`. A cached version is immutable and
//! never re-validated against the backend: version content is append-only,
//! so presence alone proves freshness. Local filenames mirror the remote
//! names verbatim; each version lives in its own directory, which is what
//! makes that safe.
//!
//! Materialization is atomic (write to a temp directory, rename into place)
//! and single-flight: concurrent readers of the same uncached version share
//! one backend fetch through a per-key mutex registry. Pruning skips entries
//! with live read guards.

use crate::cancel::CancellationToken;
use crate::error::{PinboardError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

type ReaderCounts = Arc<StdMutex<HashMap<String, usize>>>;

/// Local mirror of pin versions under one cache namespace directory.
pub struct VersionCache {
    root: PathBuf,
    /// Per-key fetch locks; the single-flight registry.
    inflight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Live read guards per key; protects entries from pruning mid-read.
    readers: ReaderCounts,
}

/// A materialized cache entry plus a guard keeping it alive while read.
#[derive(Debug)]
pub struct CacheHit {
    dir: PathBuf,
    _guard: ReadGuard,
}

impl CacheHit {
    /// Directory holding the version's files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read one file from the entry.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PinboardError::cache_io(e, path))
    }
}

/// Decrements the reader count for its key on drop.
#[derive(Debug)]
struct ReadGuard {
    key: String,
    readers: ReaderCounts,
}

impl ReadGuard {
    fn acquire(key: &str, readers: &ReaderCounts) -> Self {
        let mut counts = readers.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(key.to_string()).or_insert(0) += 1;
        Self {
            key: key.to_string(),
            readers: readers.clone(),
        }
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let mut counts = self.readers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.key);
            }
        }
    }
}

impl VersionCache {
    /// Open (or create) a cache rooted at `<cache_root>/<namespace>`.
    pub fn new(cache_root: &Path, namespace: &str) -> Result<Self> {
        let root = cache_root.join(namespace);
        std::fs::create_dir_all(&root).map_err(|e| PinboardError::cache_io(e, &root))?;
        Ok(Self {
            root,
            inflight: AsyncMutex::new(HashMap::new()),
            readers: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    /// The namespace directory this cache manages.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key(pin: &str, version: &str) -> String {
        format!("{pin}/{version}")
    }

    fn entry_dir(&self, pin: &str, version: &str) -> PathBuf {
        self.root.join(pin).join(version)
    }

    /// Whether a version is already materialized.
    pub fn contains(&self, pin: &str, version: &str) -> bool {
        self.entry_dir(pin, version).is_dir()
    }

    /// Get a version's files, fetching and materializing them on a miss.
    ///
    /// `fetch` produces the version's files as `(name, bytes)` pairs; it is
    /// only awaited by the caller that wins the per-key lock. Waiters blocked
    /// on the same key re-check for the entry once the winner finishes and
    /// only fetch themselves if it is still absent (the winner was
    /// cancelled or failed). Cancelling a waiter never cancels the winner's
    /// materialization.
    pub async fn get_or_fetch<F>(
        &self,
        pin: &str,
        version: &str,
        token: &CancellationToken,
        fetch: F,
    ) -> Result<CacheHit>
    where
        F: Future<Output = Result<Vec<(String, Vec<u8>)>>>,
    {
        let key = Self::key(pin, version);
        let dir = self.entry_dir(pin, version);

        if dir.is_dir() {
            debug!("Cache hit for {key}");
            return Ok(self.hit(&key, dir));
        }

        // Miss: take the per-key lock so exactly one caller fetches.
        let lock = {
            let mut registry = self.inflight.lock().await;
            registry.entry(key.clone()).or_default().clone()
        };
        let _fetch_permit = lock.lock().await;

        // Another caller may have materialized while we waited.
        if dir.is_dir() {
            debug!("Cache hit for {key} after waiting on in-flight fetch");
            self.unregister(&key).await;
            return Ok(self.hit(&key, dir));
        }

        debug!("Cache miss for {key}, fetching");
        let outcome = async {
            token.check()?;
            let files = fetch.await?;
            token.check()?;
            self.materialize(&dir, &files)
        }
        .await;
        self.unregister(&key).await;
        outcome?;

        Ok(self.hit(&key, dir))
    }

    /// Materialize files already in hand (used after a board write, so the
    /// next read is local). Errors are cache errors; callers may ignore them.
    pub fn store(&self, pin: &str, version: &str, files: &[(String, Vec<u8>)]) -> Result<()> {
        let dir = self.entry_dir(pin, version);
        if dir.is_dir() {
            return Ok(());
        }
        self.materialize(&dir, files)
    }

    /// Drop one version's entry. Skipped (with a warning) while readers hold
    /// guards on it.
    pub fn invalidate(&self, pin: &str, version: &str) -> Result<()> {
        let key = Self::key(pin, version);
        if self.reader_count(&key) > 0 {
            warn!("Not invalidating cache entry {key}: readers active");
            return Ok(());
        }
        let dir = self.entry_dir(pin, version);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir).map_err(|e| PinboardError::cache_io(e, &dir))?;
            debug!("Invalidated cache entry {key}");
        }
        Ok(())
    }

    /// Drop every cached version of a pin.
    pub fn invalidate_pin(&self, pin: &str) -> Result<()> {
        let pin_dir = self.root.join(pin);
        if !pin_dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&pin_dir).map_err(|e| PinboardError::cache_io(e, &pin_dir))? {
            let entry = entry.map_err(|e| PinboardError::cache_io(e, &pin_dir))?;
            if let Some(version) = entry.file_name().to_str() {
                self.invalidate(pin, version)?;
            }
        }
        // Remove the pin directory itself once empty.
        let _ = std::fs::remove_dir(&pin_dir);
        Ok(())
    }

    /// Remove entries whose materialization is older than `max_age`.
    /// Entries with live read guards are left alone.
    pub fn prune(&self, max_age: Duration) -> Result<usize> {
        let cutoff = std::time::SystemTime::now() - max_age;
        let mut removed = 0;

        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let version_dir = entry.path();
            let pin = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let version = entry.file_name().to_string_lossy().to_string();

            let mtime = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                Some(t) => t,
                None => continue,
            };
            if mtime >= cutoff {
                continue;
            }
            if self.reader_count(&Self::key(&pin, &version)) > 0 {
                continue;
            }

            std::fs::remove_dir_all(version_dir)
                .map_err(|e| PinboardError::cache_io(e, version_dir))?;
            removed += 1;
        }

        if removed > 0 {
            debug!("Pruned {removed} cache entries under {}", self.root.display());
        }
        Ok(removed)
    }

    fn hit(&self, key: &str, dir: PathBuf) -> CacheHit {
        CacheHit {
            dir,
            _guard: ReadGuard::acquire(key, &self.readers),
        }
    }

    fn reader_count(&self, key: &str) -> usize {
        self.readers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    async fn unregister(&self, key: &str) {
        self.inflight.lock().await.remove(key);
    }

    /// Write files to a temp directory and rename it into place, so a
    /// concurrent reader never observes a half-written entry.
    fn materialize(&self, dir: &Path, files: &[(String, Vec<u8>)]) -> Result<()> {
        let parent = dir
            .parent()
            .ok_or_else(|| PinboardError::Other("cache entry has no parent".to_string()))?;
        std::fs::create_dir_all(parent).map_err(|e| PinboardError::cache_io(e, parent))?;

        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(parent)
            .map_err(|e| PinboardError::cache_io(e, parent))?;

        for (name, bytes) in files {
            let path = staging.path().join(name);
            if let Some(file_parent) = path.parent() {
                std::fs::create_dir_all(file_parent)
                    .map_err(|e| PinboardError::cache_io(e, file_parent))?;
            }
            std::fs::write(&path, bytes).map_err(|e| PinboardError::cache_io(e, &path))?;
        }

        let staging_path = staging.keep();
        match std::fs::rename(&staging_path, dir) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A concurrent writer may have won the rename; their entry is
                // identical, so this caller can use it.
                let _ = std::fs::remove_dir_all(&staging_path);
                if dir.is_dir() {
                    Ok(())
                } else {
                    Err(PinboardError::cache_io(e, dir))
                }
            }
        }
    }
}
