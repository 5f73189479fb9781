//! Error types for the pinboard crate.
//!
//! Every fallible operation in the crate returns [`Result`], and error
//! variants carry enough context (pin name, version, path) that callers can
//! report failures without re-deriving where they happened.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pinboard operations.
#[derive(Debug, Error)]
pub enum PinboardError {
    // Pin resolution errors
    #[error("Pin not found: {name}")]
    PinNotFound { name: String },

    #[error("Version not found for pin '{name}': {version}")]
    VersionNotFound { name: String, version: String },

    // Format / payload errors
    #[error("Format '{format}' is not supported for {capability} payloads")]
    UnsupportedFormat { format: String, capability: String },

    #[error("Unknown format tag: {tag}")]
    UnknownFormat { tag: String },

    #[error("Reading pin '{name}' requires decoding a binary object; enable `allow_blob_read` on the board config to permit it")]
    BlobReadDenied { name: String },

    #[error("Failed to decode pin data as {format}: {message}")]
    Decode { format: String, message: String },

    // Version identifier errors
    #[error("Invalid version identifier '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Cannot create a version from an empty file manifest")]
    EmptyManifest,

    // Backend I/O errors (not retried here; retry policy belongs to the backend)
    #[error("Backend write failed at '{path}': {message}")]
    BackendWrite {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Backend read failed at '{path}': {message}")]
    BackendRead {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Stored manifest failed to parse; never silently repaired
    #[error("Corrupt manifest for pin '{name}' version '{version}': {message}")]
    ManifestCorrupt {
        name: String,
        version: String,
        message: String,
    },

    // Local cache failures; the board falls back to direct backend reads
    #[error("Cache I/O error at {path:?}: {message}")]
    CacheIo {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Local file system errors outside the cache
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for pinboard operations.
pub type Result<T> = std::result::Result<T, PinboardError>;

// Conversion implementations for common error types

impl From<std::io::Error> for PinboardError {
    fn from(err: std::io::Error) -> Self {
        PinboardError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PinboardError {
    fn from(err: serde_json::Error) -> Self {
        PinboardError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PinboardError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PinboardError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a cache IO error with path context.
    pub fn cache_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PinboardError::CacheIo {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error came from the local cache rather than the backend.
    ///
    /// The board uses this to decide when a direct backend read may still
    /// succeed after a cache failure.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, PinboardError::CacheIo { .. })
    }
}
