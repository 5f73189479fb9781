//! Access-time local cache for URL-addressed sources.
//!
//! Used where no version identifier exists: entries are keyed by source URL
//! and re-use trades strict version correctness for usability against
//! mutable remote content. Every successful read touches the entry's access
//! time; when the entry count exceeds the configured ceiling, the least
//! recently accessed entries are evicted first. Entries being read are never
//! evicted mid-read.
//!
//! Local filenames are remapped (the URL hash names the entry directory) and
//! the original URL is kept in a persisted mapping table, written atomically
//! the same way version manifests are.

use crate::cancel::CancellationToken;
use crate::error::{PinboardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Default entry-count ceiling.
const DEFAULT_MAX_ENTRIES: usize = 64;

/// Mapping-table filename inside the namespace directory.
const STATE_FILENAME: &str = "entries.json";

/// Local filename every entry's bytes are remapped to.
const DATA_FILENAME: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryState {
    url: String,
    last_access: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    entries: HashMap<String, EntryState>,
}

/// URL-keyed cache with least-recently-accessed eviction.
pub struct AccessTimeCache {
    root: PathBuf,
    max_entries: usize,
    state: StdMutex<CacheState>,
    inflight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    readers: Arc<StdMutex<HashMap<String, usize>>>,
}

impl AccessTimeCache {
    /// Open (or create) a cache at `<cache_root>/<namespace>` with the
    /// default entry ceiling.
    pub fn new(cache_root: &Path, namespace: &str) -> Result<Self> {
        Self::with_max_entries(cache_root, namespace, DEFAULT_MAX_ENTRIES)
    }

    /// Open with an explicit entry-count ceiling.
    pub fn with_max_entries(
        cache_root: &Path,
        namespace: &str,
        max_entries: usize,
    ) -> Result<Self> {
        let root = cache_root.join(namespace);
        std::fs::create_dir_all(&root).map_err(|e| PinboardError::cache_io(e, &root))?;

        let state = load_state(&root.join(STATE_FILENAME));
        Ok(Self {
            root,
            max_entries,
            state: StdMutex::new(state),
            inflight: AsyncMutex::new(HashMap::new()),
            readers: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a URL currently has a materialized entry.
    pub fn contains(&self, url: &str) -> bool {
        let key = url_key(url);
        self.lock_state().entries.contains_key(&key) && self.entry_file(&key).is_file()
    }

    /// Read the bytes for `url`, fetching on a miss or after eviction.
    ///
    /// Single-flight per URL: concurrent readers of an uncached URL share
    /// one fetch. Every successful return touches the entry's access time.
    pub async fn get_or_fetch<F>(
        &self,
        url: &str,
        token: &CancellationToken,
        fetch: F,
    ) -> Result<Vec<u8>>
    where
        F: Future<Output = Result<Vec<u8>>>,
    {
        let key = url_key(url);

        if let Some(bytes) = self.try_local(&key).await {
            debug!("Access-time cache hit for {url}");
            self.touch(&key, url);
            return Ok(bytes);
        }

        let lock = {
            let mut registry = self.inflight.lock().await;
            registry.entry(key.clone()).or_default().clone()
        };
        let _fetch_permit = lock.lock().await;

        if let Some(bytes) = self.try_local(&key).await {
            debug!("Access-time cache hit for {url} after waiting on in-flight fetch");
            self.inflight.lock().await.remove(&key);
            self.touch(&key, url);
            return Ok(bytes);
        }

        debug!("Access-time cache miss for {url}, fetching");
        let outcome: Result<Vec<u8>> = async {
            token.check()?;
            let bytes = fetch.await?;
            token.check()?;
            self.materialize(&key, &bytes)?;
            Ok(bytes)
        }
        .await;
        self.inflight.lock().await.remove(&key);
        let bytes = outcome?;

        self.touch(&key, url);
        self.evict_over_limit();
        Ok(bytes)
    }

    /// Drop one URL's entry if present (no error if missing or in use).
    pub fn invalidate(&self, url: &str) {
        let key = url_key(url);
        if self.reader_count(&key) > 0 {
            warn!("Not invalidating cache entry for {url}: readers active");
            return;
        }
        let _ = std::fs::remove_dir_all(self.root.join(&key));
        self.lock_state().entries.remove(&key);
        self.persist_state();
    }

    fn entry_file(&self, key: &str) -> PathBuf {
        self.root.join(key).join(DATA_FILENAME)
    }

    async fn try_local(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_file(key);
        if !self.lock_state().entries.contains_key(key) {
            return None;
        }
        let _guard = self.acquire_reader(key);
        tokio::fs::read(&path).await.ok()
    }

    fn materialize(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.root.join(key);
        std::fs::create_dir_all(&dir).map_err(|e| PinboardError::cache_io(e, &dir))?;

        // Write-then-rename so concurrent readers never see partial bytes.
        let tmp = dir.join(format!(".{DATA_FILENAME}.{}.tmp", std::process::id()));
        std::fs::write(&tmp, bytes).map_err(|e| PinboardError::cache_io(e, &tmp))?;
        std::fs::rename(&tmp, self.entry_file(key))
            .map_err(|e| PinboardError::cache_io(e, self.entry_file(key)))?;
        Ok(())
    }

    fn touch(&self, key: &str, url: &str) {
        self.lock_state().entries.insert(
            key.to_string(),
            EntryState {
                url: url.to_string(),
                last_access: Utc::now(),
            },
        );
        self.persist_state();
    }

    fn evict_over_limit(&self) {
        loop {
            let victim = {
                let state = self.lock_state();
                if state.entries.len() <= self.max_entries {
                    return;
                }
                state
                    .entries
                    .iter()
                    .filter(|(key, _)| self.reader_count(key) == 0)
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(key, entry)| (key.clone(), entry.url.clone()))
            };

            let (key, url) = match victim {
                Some(v) => v,
                // Everything over the limit is being read; try again later.
                None => return,
            };

            debug!("Evicting least-recently-accessed cache entry for {url}");
            let _ = std::fs::remove_dir_all(self.root.join(&key));
            self.lock_state().entries.remove(&key);
            self.persist_state();
        }
    }

    fn acquire_reader(&self, key: &str) -> ReaderGuard {
        let mut counts = self.readers.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(key.to_string()).or_insert(0) += 1;
        ReaderGuard {
            key: key.to_string(),
            readers: self.readers.clone(),
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

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist the mapping table atomically. Losing it only resets access
    /// ordering, so failures are logged rather than surfaced.
    fn persist_state(&self) {
        let path = self.root.join(STATE_FILENAME);
        let serialized = {
            let state = self.lock_state();
            serde_json::to_vec_pretty(&*state)
        };
        let result = serialized.map_err(PinboardError::from).and_then(|bytes| {
            let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
            std::fs::write(&tmp, bytes).map_err(|e| PinboardError::cache_io(e, &tmp))?;
            std::fs::rename(&tmp, &path).map_err(|e| PinboardError::cache_io(e, &path))
        });
        if let Err(e) = result {
            warn!("Failed to persist cache state at {}: {e}", path.display());
        }
    }
}

struct ReaderGuard {
    key: String,
    readers: Arc<StdMutex<HashMap<String, usize>>>,
}

impl Drop for ReaderGuard {
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

fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn load_state(path: &Path) -> CacheState {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Ignoring unreadable cache state at {}: {e}", path.display());
            CacheState::default()
        }),
        Err(_) => CacheState::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
        let token = CancellationToken::new();
        let fetches = AtomicUsize::new(0);

        let url = "https://example.com/pins/df.csv";
        for _ in 0..3 {
            let bytes = cache
                .get_or_fetch(url, &token, async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(b"a,b\n".to_vec())
                })
                .await
                .unwrap();
            assert_eq!(bytes, b"a,b\n");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(cache.contains(url));
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::with_max_entries(tmp.path(), "ns", 2).unwrap();
        let token = CancellationToken::new();

        for url in ["u1", "u2"] {
            cache
                .get_or_fetch(url, &token, async { Ok(url.as_bytes().to_vec()) })
                .await
                .unwrap();
        }

        // Touch u1 so u2 becomes the least recently accessed.
        cache
            .get_or_fetch("u1", &token, async { unreachable!() })
            .await
            .unwrap();

        // Inserting a third entry evicts u2.
        cache
            .get_or_fetch("u3", &token, async { Ok(b"3".to_vec()) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("u1"));
        assert!(!cache.contains("u2"));
        assert!(cache.contains("u3"));
    }

    #[tokio::test]
    async fn test_evicted_entry_refetches() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::with_max_entries(tmp.path(), "ns", 1).unwrap();
        let token = CancellationToken::new();
        let fetches = AtomicUsize::new(0);

        let fetch_u1 = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(b"one".to_vec())
        };

        cache.get_or_fetch("u1", &token, fetch_u1()).await.unwrap();
        cache
            .get_or_fetch("u2", &token, async { Ok(b"two".to_vec()) })
            .await
            .unwrap();
        assert!(!cache.contains("u1"));

        let bytes = cache.get_or_fetch("u1", &token, fetch_u1()).await.unwrap();
        assert_eq!(bytes, b"one");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let token = CancellationToken::new();

        {
            let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
            cache
                .get_or_fetch("u1", &token, async { Ok(b"one".to_vec()) })
                .await
                .unwrap();
        }

        let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
        assert!(cache.contains("u1"));
        let bytes = cache
            .get_or_fetch("u1", &token, async { unreachable!() })
            .await
            .unwrap();
        assert_eq!(bytes, b"one");
    }

    #[tokio::test]
    async fn test_invalidate() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
        let token = CancellationToken::new();

        cache
            .get_or_fetch("u1", &token, async { Ok(b"one".to_vec()) })
            .await
            .unwrap();
        cache.invalidate("u1");
        assert!(!cache.contains("u1"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = cache
            .get_or_fetch("u1", &token, async { Ok(b"one".to_vec()) })
            .await;
        assert!(matches!(result.unwrap_err(), PinboardError::Cancelled));
        assert!(!cache.contains("u1"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_no_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = AccessTimeCache::new(tmp.path(), "ns").unwrap();
        let token = CancellationToken::new();

        let result = cache
            .get_or_fetch("u1", &token, async {
                Err(PinboardError::Other("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("u1"));
        assert!(cache.is_empty());
    }
}
