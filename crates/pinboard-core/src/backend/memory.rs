//! In-memory backend.
//!
//! Shares its store across clones, which makes it the backend of choice for
//! tests exercising cache behavior: `read_count` exposes how many file reads
//! actually reached the backend, so tests can assert that cached reads never
//! re-fetch.

use crate::backend::{FileEntry, Filesystem};
use crate::error::{PinboardError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredFile {
    bytes: Vec<u8>,
    mtime: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    files: BTreeMap<String, StoredFile>,
    dirs: BTreeSet<String>,
}

/// Backend backed by process memory (protocol `memory`).
#[derive(Debug, Clone)]
pub struct MemoryFs {
    name: String,
    store: Arc<Mutex<Store>>,
    reads: Arc<AtomicUsize>,
}

impl MemoryFs {
    /// Create an empty store. `name` is the backend identity; two stores with
    /// different names never share a cache namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(Mutex::new(Store::default())),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of file reads that reached this backend.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // Mutex poisoning only happens if a holder panicked; propagating the
        // inner data is still sound for a plain map.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn child_of<'a>(key: &'a str, dir: &str) -> Option<&'a str> {
    let rest = if dir.is_empty() {
        key
    } else {
        key.strip_prefix(dir)?.strip_prefix('/')?
    };
    Some(rest.split('/').next().unwrap_or(rest))
}

#[async_trait]
impl Filesystem for MemoryFs {
    fn protocol(&self) -> &str {
        "memory"
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let path = normalize(path);
        let store = self.lock();
        store
            .files
            .get(&path)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| PinboardError::BackendRead {
                path,
                message: "no such file".to_string(),
                source: None,
            })
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = normalize(path);
        self.lock().files.insert(
            path,
            StoredFile {
                bytes: bytes.to_vec(),
                mtime: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let dir = normalize(path);
        let store = self.lock();

        if !dir.is_empty()
            && !store.dirs.contains(&dir)
            && !store.files.keys().any(|k| child_of(k, &dir).is_some())
        {
            return Err(PinboardError::BackendRead {
                path: dir,
                message: "no such directory".to_string(),
                source: None,
            });
        }

        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();

        for (key, file) in &store.files {
            if let Some(child) = child_of(key, &dir) {
                if !seen.insert(child.to_string()) {
                    continue;
                }
                let is_dir = key != &crate::backend::join_path(&dir, child);
                entries.push(FileEntry {
                    name: child.to_string(),
                    is_dir,
                    size: if is_dir { 0 } else { file.bytes.len() as u64 },
                    mtime: if is_dir { None } else { Some(file.mtime) },
                });
            }
        }
        for key in &store.dirs {
            if let Some(child) = child_of(key, &dir) {
                if seen.insert(child.to_string()) {
                    entries.push(FileEntry {
                        name: child.to_string(),
                        is_dir: true,
                        size: 0,
                        mtime: None,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        if path.is_empty() {
            return Ok(true);
        }
        let store = self.lock();
        Ok(store.files.contains_key(&path)
            || store.dirs.contains(&path)
            || store.dirs.iter().any(|d| d.starts_with(&format!("{path}/")))
            || store
                .files
                .keys()
                .any(|k| k.starts_with(&format!("{path}/"))))
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        if !path.is_empty() {
            self.lock().dirs.insert(path);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let prefix = format!("{path}/");
        let mut store = self.lock();
        let had_any = store.files.contains_key(&path)
            || store.dirs.contains(&path)
            || store.files.keys().any(|k| k.starts_with(&prefix))
            || store.dirs.iter().any(|d| d.starts_with(&prefix));
        if !had_any {
            return Err(PinboardError::BackendRead {
                path,
                message: "no such file or directory".to_string(),
                source: None,
            });
        }
        store.files.remove(&path);
        store.files.retain(|k, _| !k.starts_with(&prefix));
        store.dirs.remove(&path);
        store.dirs.retain(|d| !d.starts_with(&prefix));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let prefix = format!("{from}/");
        let mut store = self.lock();

        if let Some(file) = store.files.remove(&from) {
            store.files.insert(to.clone(), file);
        }

        let moved: Vec<(String, StoredFile)> = store
            .files
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, file) in moved {
            store.files.remove(&key);
            let new_key = format!("{to}/{}", &key[prefix.len()..]);
            store.files.insert(new_key, file);
        }

        if store.dirs.remove(&from) {
            store.dirs.insert(to.clone());
        }
        let moved_dirs: Vec<String> = store
            .dirs
            .iter()
            .filter(|d| d.starts_with(&prefix))
            .cloned()
            .collect();
        for dir in moved_dirs {
            store.dirs.remove(&dir);
            store.dirs.insert(format!("{to}/{}", &dir[prefix.len()..]));
        }

        Ok(())
    }
}
