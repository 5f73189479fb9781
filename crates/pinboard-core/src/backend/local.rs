//! Local-disk backend.

use crate::backend::{FileEntry, Filesystem};
use crate::error::{PinboardError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Backend rooted at a local directory (protocol `file`).
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Open a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| PinboardError::io_with_path(e, &root))?;
        Ok(Self { root })
    }

    /// Absolute path for a backend-relative path.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut out = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            out.push(part);
        }
        out
    }
}

fn read_err(path: &Path, e: std::io::Error) -> PinboardError {
    PinboardError::BackendRead {
        path: path.display().to_string(),
        message: e.to_string(),
        source: Some(e),
    }
}

fn write_err(path: &Path, e: std::io::Error) -> PinboardError {
    PinboardError::BackendWrite {
        path: path.display().to_string(),
        message: e.to_string(),
        source: Some(e),
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    fn protocol(&self) -> &str {
        "file"
    }

    fn identity(&self) -> String {
        // Canonicalize so `a/b` and `./a/b` share a cache namespace.
        std::fs::canonicalize(&self.root)
            .unwrap_or_else(|_| self.root.clone())
            .display()
            .to_string()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        tokio::fs::read(&full).await.map_err(|e| read_err(&full, e))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_err(parent, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| write_err(&full, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full = self.resolve(path);
        let mut dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| read_err(&full, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| read_err(&full, e))? {
            let meta = entry.metadata().await.map_err(|e| read_err(&full, e))?;
            let mtime = meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t));
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                mtime,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false))
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| write_err(&full, e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| read_err(&full, e))?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&full)
                .await
                .map_err(|e| write_err(&full, e))
        } else {
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| write_err(&full, e))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_full = self.resolve(from);
        let to_full = self.resolve(to);
        if let Some(parent) = to_full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_err(parent, e))?;
        }
        tokio::fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| write_err(&from_full, e))
    }
}
