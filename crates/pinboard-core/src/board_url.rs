//! Read-only boards over arbitrary per-pin URLs.
//!
//! A [`BoardUrl`] maps pin names to URLs of serialized payload files. The
//! sources carry no version manifest, so reads go through the access-time
//! cache rather than the version-pinned one: cached bytes are re-used by
//! recency, not by version identity. The format is inferred from the URL's
//! file extension.
//!
//! Actual transports implement [`UrlFetcher`]; the in-tree [`FileFetcher`]
//! resolves URLs as paths under a local root.

use crate::adaptor::{read_payload, Format};
use crate::cache::{namespace, AccessTimeCache};
use crate::cancel::CancellationToken;
use crate::config::BoardConfig;
use crate::data::Payload;
use crate::error::{PinboardError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Transport seam for URL-addressed sources.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Protocol identifier, e.g. `file`, `http`.
    fn protocol(&self) -> &str;

    /// Stable identity of the source (base path or server URL), used for
    /// cache namespace derivation.
    fn identity(&self) -> String;

    /// Fetch the full contents behind a URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetcher resolving URLs as paths under a local root directory.
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl UrlFetcher for FileFetcher {
    fn protocol(&self) -> &str {
        "file"
    }

    fn identity(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.root.join(url);
        tokio::fs::read(&path)
            .await
            .map_err(|e| PinboardError::BackendRead {
                path: path.to_string_lossy().into_owned(),
                message: e.to_string(),
                source: Some(e),
            })
    }
}

/// Read-only board resolving pin names through a URL map.
pub struct BoardUrl {
    pins: BTreeMap<String, String>,
    fetcher: Arc<dyn UrlFetcher>,
    cache: Option<AccessTimeCache>,
    allow_blob_read: bool,
}

impl BoardUrl {
    /// Open a URL board. `pins` maps each pin name to the URL of its
    /// serialized payload. The `versioned` flag on the config is ignored;
    /// URL sources expose no version history.
    pub fn new(
        pins: BTreeMap<String, String>,
        fetcher: Arc<dyn UrlFetcher>,
        config: BoardConfig,
    ) -> Result<Self> {
        let cache = match config.cache.resolve() {
            Some(root) => {
                let ns = namespace::derive(fetcher.protocol(), &fetcher.identity());
                Some(AccessTimeCache::new(&root, &ns)?)
            }
            None => None,
        };
        Ok(Self {
            pins,
            fetcher,
            cache,
            allow_blob_read: config.allow_blob_read,
        })
    }

    /// Names of all mapped pins, in name order.
    pub fn pin_list(&self) -> Vec<String> {
        self.pins.keys().cloned().collect()
    }

    pub fn pin_exists(&self, name: &str) -> bool {
        self.pins.contains_key(name)
    }

    /// Read a pin's payload from its mapped URL.
    pub async fn pin_read(&self, name: &str) -> Result<Payload> {
        self.pin_read_with(name, &CancellationToken::new()).await
    }

    /// [`pin_read`](Self::pin_read) with an explicit cancellation token.
    pub async fn pin_read_with(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<Payload> {
        let url = self
            .pins
            .get(name)
            .ok_or_else(|| PinboardError::PinNotFound {
                name: name.to_string(),
            })?;
        let format = format_from_url(url)?;
        if format == Format::Blob && !self.allow_blob_read {
            return Err(PinboardError::BlobReadDenied {
                name: name.to_string(),
            });
        }

        let bytes = match &self.cache {
            Some(cache) => match cache
                .get_or_fetch(url, token, self.fetcher.fetch(url))
                .await
            {
                Ok(bytes) => bytes,
                Err(e) if e.is_cache_error() => {
                    warn!("Cache read failed for {name} ({url}): {e}; fetching directly");
                    self.fetcher.fetch(url).await?
                }
                Err(e) => return Err(e),
            },
            None => {
                token.check()?;
                self.fetcher.fetch(url).await?
            }
        };

        // No manifest here, so no column hint; tabular snapshots written as
        // `json` read back as plain values.
        read_payload(format, &bytes, None)
    }

    /// Reconstruction hint; URLs may embed credentials, so only the source
    /// identity appears.
    pub fn deparse(&self) -> String {
        format!("board_url('{}')", self.fetcher.identity())
    }
}

/// Infer the serialization format from a URL's file extension.
fn format_from_url(url: &str) -> Result<Format> {
    let file = url
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let extension = file.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    Format::from_tag(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::data::DataFrame;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MapFetcher {
        files: HashMap<String, Vec<u8>>,
        fetches: AtomicUsize,
    }

    impl MapFetcher {
        fn new(files: HashMap<String, Vec<u8>>) -> Self {
            Self {
                files,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UrlFetcher for MapFetcher {
        fn protocol(&self) -> &str {
            "memory"
        }

        fn identity(&self) -> String {
            "map".to_string()
        }

        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| PinboardError::BackendRead {
                    path: url.to_string(),
                    message: "no such file".to_string(),
                    source: None,
                })
        }
    }

    fn sample_board(
        cache: CacheConfig,
    ) -> (BoardUrl, Arc<MapFetcher>) {
        let fetcher = Arc::new(MapFetcher::new(HashMap::from([
            ("data/df.csv".to_string(), b"a,b\n1,4\n2,5\n".to_vec()),
            ("data/params.json".to_string(), b"{\"k\":1}".to_vec()),
            ("data/model.blob".to_string(), vec![0x93]),
        ])));
        let pins = BTreeMap::from([
            ("df".to_string(), "data/df.csv".to_string()),
            ("params".to_string(), "data/params.json".to_string()),
            ("model".to_string(), "data/model.blob".to_string()),
        ]);
        let config = BoardConfig {
            cache,
            ..BoardConfig::default()
        };
        let board = BoardUrl::new(pins, fetcher.clone(), config).unwrap();
        (board, fetcher)
    }

    #[test]
    fn test_format_from_url() {
        assert_eq!(format_from_url("a/b/df.csv").unwrap(), Format::Csv);
        assert_eq!(
            format_from_url("https://host/p/x.json?tok=1").unwrap(),
            Format::Json
        );
        assert!(format_from_url("a/b/no_extension").is_err());
        assert!(format_from_url("a/b/x.feather").is_err());
    }

    #[tokio::test]
    async fn test_read_by_extension() {
        let (board, _) = sample_board(CacheConfig::Disabled);

        let df = board.pin_read("df").await.unwrap();
        let expected = Payload::Table(
            DataFrame::from_columns(vec![
                ("a".to_string(), vec![json!(1), json!(2)]),
                ("b".to_string(), vec![json!(4), json!(5)]),
            ])
            .unwrap(),
        );
        assert_eq!(df, expected);

        let params = board.pin_read("params").await.unwrap();
        assert_eq!(params, Payload::Object(json!({"k": 1})));
    }

    #[tokio::test]
    async fn test_unknown_pin() {
        let (board, _) = sample_board(CacheConfig::Disabled);
        let err = board.pin_read("ghost").await.unwrap_err();
        assert!(matches!(err, PinboardError::PinNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pin_list() {
        let (board, _) = sample_board(CacheConfig::Disabled);
        assert_eq!(board.pin_list(), vec!["df", "model", "params"]);
        assert!(board.pin_exists("df"));
        assert!(!board.pin_exists("ghost"));
    }

    #[tokio::test]
    async fn test_blob_gate() {
        let (board, _) = sample_board(CacheConfig::Disabled);
        let err = board.pin_read("model").await.unwrap_err();
        assert!(matches!(err, PinboardError::BlobReadDenied { .. }));
    }

    #[tokio::test]
    async fn test_cached_read_fetches_once() {
        let tmp = TempDir::new().unwrap();
        let (board, fetcher) =
            sample_board(CacheConfig::Root(tmp.path().to_path_buf()));

        board.pin_read("df").await.unwrap();
        board.pin_read("df").await.unwrap();
        board.pin_read("df").await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_fetcher() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.json"), b"[1,2]").unwrap();

        let pins = BTreeMap::from([("x".to_string(), "x.json".to_string())]);
        let board = BoardUrl::new(
            pins,
            Arc::new(FileFetcher::new(tmp.path())),
            BoardConfig::uncached(),
        )
        .unwrap();

        assert_eq!(
            board.pin_read("x").await.unwrap(),
            Payload::Object(json!([1, 2]))
        );
    }
}
