//! The board: versioned pin storage over a [`Filesystem`] backend.
//!
//! A board stores each pin as a directory of immutable version directories:
//!
//! ```text
//! <root>/<pin>/<version>/<pin>.<format>
//! <root>/<pin>/<version>/manifest.json
//! ```
//!
//! Writes stage the version under a hidden directory and publish it with a
//! single rename, with the manifest written last, so other readers either see
//! a complete version or none at all. Reads resolve the requested (or latest)
//! version from a live backend listing and go through the local version cache
//! when one is configured, falling back to a direct backend read if the cache
//! itself fails.

use crate::adaptor::{read_payload, Adaptor, Format};
use crate::backend::{join_path, Filesystem};
use crate::cache::{namespace, VersionCache};
use crate::cancel::CancellationToken;
use crate::config::{BoardConfig, PathsConfig};
use crate::data::Payload;
use crate::error::{PinboardError, Result};
use crate::meta::VersionMeta;
use crate::version::VersionId;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Optional overrides for a pin write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Title stored in the manifest; defaults to the generated one.
    pub title: Option<String>,
    /// Optional longer description.
    pub description: Option<String>,
    /// Serialization format; defaults by payload capability.
    pub format: Option<Format>,
}

/// Versioned pin storage over one backend.
pub struct Board {
    backend: Arc<dyn Filesystem>,
    config: BoardConfig,
    cache: Option<VersionCache>,
}

impl Board {
    /// Open a board over `backend`.
    ///
    /// When the config enables caching, the board's cache namespace is
    /// derived from the backend's protocol and identity so distinct boards
    /// sharing a cache root never collide.
    pub fn new(backend: Arc<dyn Filesystem>, config: BoardConfig) -> Result<Self> {
        let cache = match config.cache.resolve() {
            Some(root) => {
                let ns = namespace::derive(backend.protocol(), &backend.identity());
                Some(VersionCache::new(&root, &ns)?)
            }
            None => None,
        };
        Ok(Self {
            backend,
            config,
            cache,
        })
    }

    /// The board's configuration.
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Write a payload as a new pin version and return its identifier.
    pub async fn pin_write(
        &self,
        name: &str,
        payload: &Payload,
        options: WriteOptions,
    ) -> Result<VersionId> {
        self.pin_write_with(name, payload, options, &CancellationToken::new())
            .await
    }

    /// [`pin_write`](Self::pin_write) with an explicit cancellation token.
    ///
    /// Cancellation observed before the publish rename removes the staged
    /// directory; once the rename has happened the version stands.
    pub async fn pin_write_with(
        &self,
        name: &str,
        payload: &Payload,
        options: WriteOptions,
        token: &CancellationToken,
    ) -> Result<VersionId> {
        validate_pin_name(name)?;
        token.check()?;

        let adaptor = Adaptor::wrap(payload);
        let format = options
            .format
            .unwrap_or_else(|| Format::default_for(adaptor.capability()));
        let bytes = adaptor.serialize(format)?;
        let data_file = format!("{name}.{}", format.tag());

        // Version order must stay monotonic per pin even when two writes land
        // within the same second, so bump past the current latest if needed.
        let mut created = Utc::now();
        if let Ok(existing) = self.pin_versions(name).await {
            if let Some(latest) = existing.last() {
                if created.timestamp() <= latest.timestamp().timestamp() {
                    created = latest.timestamp() + chrono::Duration::seconds(1);
                }
            }
        }

        let manifest_entries = vec![(data_file.clone(), bytes.len() as u64)];
        let (version, pin_hash) = VersionId::new_with_digest(created, &manifest_entries)?;
        let version_str = version.to_string();

        let title = options
            .title
            .unwrap_or_else(|| adaptor.default_title(name));
        let meta = VersionMeta::new(
            name,
            title,
            options.description,
            format,
            vec![data_file.clone()],
            bytes.len() as u64,
            pin_hash,
            created,
            adaptor.column_specs(),
            adaptor.preview(),
        );
        let meta_bytes = meta.to_bytes()?;

        let staging = join_path(
            name,
            &format!("{}-{version_str}", PathsConfig::STAGING_PREFIX),
        );
        let version_dir = join_path(name, &version_str);

        let published = async {
            self.backend
                .write(&join_path(&staging, &data_file), &bytes)
                .await?;
            token.check()?;
            // Manifest last: a directory holding one marks a complete write.
            self.backend
                .write(
                    &join_path(&staging, PathsConfig::MANIFEST_FILENAME),
                    &meta_bytes,
                )
                .await?;
            self.backend.rename(&staging, &version_dir).await
        }
        .await;
        if published.is_err() {
            let _ = self.backend.remove(&staging).await;
        }
        published?;

        info!("Wrote pin {name} version {version_str} ({format}, {} bytes)", bytes.len());

        if !self.config.versioned {
            self.replace_older_versions(name, &version).await?;
        }

        if let Some(cache) = &self.cache {
            let files = vec![
                (data_file, bytes),
                (PathsConfig::MANIFEST_FILENAME.to_string(), meta_bytes),
            ];
            if let Err(e) = cache.store(name, &version_str, &files) {
                warn!("Failed to warm cache for {name}@{version_str}: {e}");
            }
        }

        Ok(version)
    }

    /// Read a pin's payload. `version` selects an explicit version; `None`
    /// reads the latest.
    pub async fn pin_read(&self, name: &str, version: Option<&str>) -> Result<Payload> {
        self.pin_read_with(name, version, &CancellationToken::new())
            .await
    }

    /// [`pin_read`](Self::pin_read) with an explicit cancellation token.
    pub async fn pin_read_with(
        &self,
        name: &str,
        version: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Payload> {
        let (meta, data) = self.fetch_version(name, version, token).await?;
        self.decode(name, &meta, &data)
    }

    /// Read a pin version's manifest without decoding its payload.
    pub async fn pin_meta(&self, name: &str, version: Option<&str>) -> Result<VersionMeta> {
        let (meta, _) = self
            .fetch_version(name, version, &CancellationToken::new())
            .await?;
        Ok(meta)
    }

    /// Names of all pins on the board, in name order.
    pub async fn pin_list(&self) -> Result<Vec<String>> {
        let entries = self.backend.list("").await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_dir && !e.name.starts_with('.'))
            .map(|e| e.name)
            .collect())
    }

    /// Whether a pin exists.
    pub async fn pin_exists(&self, name: &str) -> Result<bool> {
        validate_pin_name(name)?;
        self.backend.exists(name).await
    }

    /// All versions of a pin, oldest first.
    pub async fn pin_versions(&self, name: &str) -> Result<Vec<VersionId>> {
        validate_pin_name(name)?;
        if !self.backend.exists(name).await? {
            return Err(PinboardError::PinNotFound {
                name: name.to_string(),
            });
        }
        let entries = self.backend.list(name).await?;
        let mut versions: Vec<VersionId> = entries
            .iter()
            .filter(|e| e.is_dir)
            .filter_map(|e| VersionId::parse(&e.name).ok())
            .collect();
        versions.sort();
        Ok(versions)
    }

    /// Delete a pin and every version it holds.
    pub async fn pin_delete(&self, name: &str) -> Result<()> {
        validate_pin_name(name)?;
        if !self.backend.exists(name).await? {
            return Err(PinboardError::PinNotFound {
                name: name.to_string(),
            });
        }
        self.backend.remove(name).await?;
        info!("Deleted pin {name}");
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_pin(name) {
                warn!("Failed to invalidate cache for deleted pin {name}: {e}");
            }
        }
        Ok(())
    }

    /// Delete one version of a pin.
    pub async fn pin_version_delete(&self, name: &str, version: &str) -> Result<()> {
        validate_pin_name(name)?;
        let id = VersionId::parse(version)?;
        let version_str = id.to_string();
        let dir = join_path(name, &version_str);
        if !self.backend.exists(&dir).await? {
            return Err(PinboardError::VersionNotFound {
                name: name.to_string(),
                version: version_str,
            });
        }
        self.backend.remove(&dir).await?;
        info!("Deleted pin {name} version {version_str}");
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(name, &version_str) {
                warn!("Failed to invalidate cache for {name}@{version_str}: {e}");
            }
        }
        Ok(())
    }

    /// A short reconstruction hint for this board, usable in messages like
    /// "reading from {deparse}". Never includes credentials.
    pub fn deparse(&self) -> String {
        match self.backend.protocol() {
            "file" => format!("board_folder('{}')", self.backend.identity()),
            protocol => format!("board('{protocol}://{}')", self.backend.identity()),
        }
    }

    /// Remove cached versions not touched within `max_age`. No-op on
    /// uncached boards.
    pub fn prune_cache(&self, max_age: Duration) -> Result<usize> {
        match &self.cache {
            Some(cache) => cache.prune(max_age),
            None => Ok(0),
        }
    }

    async fn fetch_version(
        &self,
        name: &str,
        version: Option<&str>,
        token: &CancellationToken,
    ) -> Result<(VersionMeta, Vec<u8>)> {
        validate_pin_name(name)?;
        token.check()?;
        let version = self.resolve_version(name, version).await?.to_string();

        if let Some(cache) = &self.cache {
            match self.read_via_cache(cache, name, &version, token).await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_cache_error() => {
                    warn!("Cache read failed for {name}@{version}: {e}; reading from backend");
                }
                Err(e) => return Err(e),
            }
        }

        self.read_direct(name, &version).await
    }

    async fn resolve_version(&self, name: &str, version: Option<&str>) -> Result<VersionId> {
        match version {
            Some(requested) => {
                let id = VersionId::parse(requested)?;
                let version_str = id.to_string();
                // A cached version is immutable, so presence in the cache
                // settles existence without a backend round-trip.
                if let Some(cache) = &self.cache {
                    if cache.contains(name, &version_str) {
                        return Ok(id);
                    }
                }
                let dir = join_path(name, &version_str);
                if !self.backend.exists(&dir).await? {
                    return Err(PinboardError::VersionNotFound {
                        name: name.to_string(),
                        version: version_str,
                    });
                }
                Ok(id)
            }
            None => {
                let versions = self.pin_versions(name).await?;
                versions
                    .into_iter()
                    .next_back()
                    .ok_or_else(|| PinboardError::PinNotFound {
                        name: name.to_string(),
                    })
            }
        }
    }

    async fn read_via_cache(
        &self,
        cache: &VersionCache,
        name: &str,
        version: &str,
        token: &CancellationToken,
    ) -> Result<(VersionMeta, Vec<u8>)> {
        let dir = join_path(name, version);
        let backend = &self.backend;

        let hit = cache
            .get_or_fetch(name, version, token, async {
                debug!("Fetching {name}@{version} from backend into cache");
                let manifest_path = join_path(&dir, PathsConfig::MANIFEST_FILENAME);
                let manifest_bytes = backend.read(&manifest_path).await?;
                let meta = VersionMeta::from_bytes(&manifest_bytes, name, version)?;

                let mut files = Vec::with_capacity(meta.files.len() + 1);
                for file in &meta.files {
                    let bytes = backend.read(&join_path(&dir, file)).await?;
                    files.push((file.clone(), bytes));
                }
                files.push((
                    PathsConfig::MANIFEST_FILENAME.to_string(),
                    manifest_bytes,
                ));
                Ok(files)
            })
            .await?;

        let manifest_bytes = hit.read(PathsConfig::MANIFEST_FILENAME).await?;
        let meta = VersionMeta::from_bytes(&manifest_bytes, name, version)?;
        let data = hit.read(meta.data_file()?).await?;
        Ok((meta, data))
    }

    async fn read_direct(&self, name: &str, version: &str) -> Result<(VersionMeta, Vec<u8>)> {
        let dir = join_path(name, version);
        let manifest_bytes = self
            .backend
            .read(&join_path(&dir, PathsConfig::MANIFEST_FILENAME))
            .await?;
        let meta = VersionMeta::from_bytes(&manifest_bytes, name, version)?;
        let data = self.backend.read(&join_path(&dir, meta.data_file()?)).await?;
        Ok((meta, data))
    }

    fn decode(&self, name: &str, meta: &VersionMeta, data: &[u8]) -> Result<Payload> {
        if meta.format == Format::Blob && !self.config.allow_blob_read {
            return Err(PinboardError::BlobReadDenied {
                name: name.to_string(),
            });
        }
        let columns = meta.column_names();
        read_payload(meta.format, data, columns.as_deref())
    }

    /// Unversioned boards keep a single version per pin. Drop everything older
    /// than the one just published.
    async fn replace_older_versions(&self, name: &str, keep: &VersionId) -> Result<()> {
        for old in self.pin_versions(name).await? {
            if &old == keep {
                continue;
            }
            let old_str = old.to_string();
            self.backend.remove(&join_path(name, &old_str)).await?;
            debug!("Replaced pin {name} version {old_str}");
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.invalidate(name, &old_str) {
                    warn!("Failed to invalidate replaced version {name}@{old_str}: {e}");
                }
            }
        }
        Ok(())
    }
}

/// Pin names become path segments on the backend, so they must be plain
/// relative names.
fn validate_pin_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(PinboardError::Config {
            message: format!(
                "invalid pin name '{name}': use letters, digits, '-', '_' or '.', not starting with '.'"
            ),
        })
    }
}
