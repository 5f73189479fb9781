//! Board configuration.
//!
//! All environment-influenced defaults (cache root, binary-object read
//! permission) are resolved by the caller and passed in here as plain values;
//! the library itself reads no environment variables and keeps no global
//! state.

use std::path::PathBuf;

/// Filenames and directory names used across the crate.
pub struct PathsConfig;

impl PathsConfig {
    /// Manifest filename inside each version directory.
    pub const MANIFEST_FILENAME: &'static str = "manifest.json";
    /// Prefix for staging directories during a version write.
    pub const STAGING_PREFIX: &'static str = ".staging";
    /// Subdirectory of the user cache dir used as the default cache root.
    pub const CACHE_DIR_NAME: &'static str = "pinboard";
    /// Subdirectory of the user data dir used by local boards.
    pub const DATA_DIR_NAME: &'static str = "pinboard";
}

/// Local cache selection for a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheConfig {
    /// Cache under the platform cache directory (see [`default_cache_root`]).
    #[default]
    Default,
    /// No local cache; every read goes to the backend.
    Disabled,
    /// Cache under an explicit root directory.
    Root(PathBuf),
}

impl CacheConfig {
    /// Resolve to a concrete cache root, or `None` when caching is disabled.
    pub fn resolve(&self) -> Option<PathBuf> {
        match self {
            CacheConfig::Default => Some(default_cache_root()),
            CacheConfig::Disabled => None,
            CacheConfig::Root(path) => Some(path.clone()),
        }
    }
}

/// Default cache root: `<platform cache dir>/pinboard`.
///
/// Falls back to a path under the temp directory when the platform reports no
/// cache directory (some containerized environments).
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PathsConfig::CACHE_DIR_NAME)
}

/// Default data root for local boards: `<platform data dir>/pinboard`.
pub fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PathsConfig::DATA_DIR_NAME)
}

/// Configuration for constructing a [`Board`](crate::board::Board).
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Whether writes create new versions (append-only). Unversioned boards
    /// keep a single version per pin, replaced on write.
    pub versioned: bool,
    /// Local cache selection.
    pub cache: CacheConfig,
    /// Permit decoding generic binary-object (`blob`) pins on read.
    pub allow_blob_read: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            versioned: true,
            cache: CacheConfig::Default,
            allow_blob_read: false,
        }
    }
}

impl BoardConfig {
    /// Config with caching disabled, the usual choice for local-path boards.
    pub fn uncached() -> Self {
        Self {
            cache: CacheConfig::Disabled,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_resolve() {
        assert!(CacheConfig::Default.resolve().is_some());
        assert_eq!(CacheConfig::Disabled.resolve(), None);

        let root = PathBuf::from("/tmp/custom-cache");
        assert_eq!(CacheConfig::Root(root.clone()).resolve(), Some(root));
    }

    #[test]
    fn test_default_board_config() {
        let config = BoardConfig::default();
        assert!(config.versioned);
        assert!(!config.allow_blob_read);
        assert_eq!(config.cache, CacheConfig::Default);
    }

    #[test]
    fn test_uncached_config() {
        let config = BoardConfig::uncached();
        assert_eq!(config.cache, CacheConfig::Disabled);
        assert!(config.versioned);
    }

    #[test]
    fn test_default_cache_root_ends_with_crate_dir() {
        let root = default_cache_root();
        assert!(root.ends_with(PathsConfig::CACHE_DIR_NAME));
    }
}
