//! Temporary-directory backend with explicit lifetime ownership.
//!
//! The backend owns its directory: it is created on construction and deleted
//! on [`TempBackend::close`] or when the last handle is dropped. Nothing
//! relies on garbage-collection timing.

use crate::backend::{FileEntry, Filesystem, LocalFs};
use crate::error::{PinboardError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::TempDir;

/// Backend rooted at an owned temporary directory (protocol `file`).
pub struct TempBackend {
    dir: Mutex<Option<TempDir>>,
    fs: LocalFs,
}

impl TempBackend {
    /// Create a fresh temporary directory and root a backend in it.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().map_err(PinboardError::from)?;
        let fs = LocalFs::new(dir.path())?;
        Ok(Self {
            dir: Mutex::new(Some(dir)),
            fs,
        })
    }

    /// Delete the temporary directory now. Further operations fail.
    ///
    /// Idempotent: closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let taken = self
            .dir
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(dir) = taken {
            dir.close().map_err(PinboardError::from)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.dir.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
            Ok(())
        } else {
            Err(PinboardError::Other(
                "Temporary board backend has been closed".to_string(),
            ))
        }
    }
}

#[async_trait]
impl Filesystem for TempBackend {
    fn protocol(&self) -> &str {
        "file"
    }

    fn identity(&self) -> String {
        self.fs.identity()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.fs.read(path).await
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.fs.write(path, bytes).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        self.ensure_open()?;
        self.fs.list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.ensure_open()?;
        self.fs.exists(path).await
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        self.fs.make_directory(path).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        self.fs.remove(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_open()?;
        self.fs.rename(from, to).await
    }
}
