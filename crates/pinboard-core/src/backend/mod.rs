//! Storage backend capability contract.
//!
//! A board talks to remote storage only through the [`Filesystem`] trait:
//! open-for-read, open-for-write, list with mtimes, exists, make-directory,
//! remove and rename. Concrete remote implementations (object stores, HTTP,
//! content-management servers) live outside this crate; the in-tree
//! implementations cover local disk ([`LocalFs`]), memory ([`MemoryFs`], used
//! heavily in tests) and scoped temporary boards ([`TempBackend`]).
//!
//! Contract note: implementations must not cache directory listings. The
//! board relies on `list` reflecting writes made by other processes.

mod local;
mod memory;
mod temp;

pub use local::LocalFs;
pub use memory::MemoryFs;
pub use temp::TempBackend;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name relative to the listed directory.
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Modification time where the backend can report one.
    pub mtime: Option<DateTime<Utc>>,
}

/// Minimal filesystem capability contract a board requires of its backend.
///
/// Paths are `/`-separated strings relative to the backend root. All methods
/// are expected to be blocking-per-call with no internal retry; retry and
/// backoff policy belongs to the implementation, not the board.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Protocol identifier, e.g. `file`, `memory`, `s3`, `http`. Used for
    /// cache namespace derivation and cache-policy selection.
    fn protocol(&self) -> &str;

    /// Stable identity of this backend instance (normalized base path or
    /// server URL). Two handles with the same protocol and identity must
    /// address the same storage.
    fn identity(&self) -> String;

    /// Read the full contents of a file.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a file, creating parent directories as needed.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// List a directory. Returns entries in name order.
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a directory (and any missing parents).
    async fn make_directory(&self, path: &str) -> Result<()>;

    /// Remove a file or directory tree.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Rename `from` to `to`, atomically where the storage supports it.
    /// Boards use this to publish staged version directories.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Join two backend path fragments, ignoring empty segments.
pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("a", "b"), "a/b");
        assert_eq!(join_path("a/", "b"), "a/b");
        assert_eq!(join_path("", "b"), "b");
        assert_eq!(join_path("a", ""), "a");
    }
}
