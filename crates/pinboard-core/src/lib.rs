//! Pinboard - versioned pin storage over pluggable backends.
//!
//! A pin is a named, versioned artifact: each write appends an immutable
//! version directory (data files plus a manifest) under the pin's name on a
//! storage backend, and reads resolve an explicit or latest version, served
//! through a local cache when one is configured.
//!
//! Backends implement the [`Filesystem`] trait; local-disk, in-memory and
//! temporary-directory backends are built in. Read-only boards over
//! arbitrary per-pin URLs are available through [`BoardUrl`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pinboard::{board_temp, Payload, WriteOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> pinboard::Result<()> {
//!     let (board, _backend) = board_temp()?;
//!
//!     let payload = Payload::Object(json!({"threshold": 0.5}));
//!     let version = board.pin_write("params", &payload, WriteOptions::default()).await?;
//!     println!("wrote version {version}");
//!
//!     let back = board.pin_read("params", None).await?;
//!     assert_eq!(back, payload);
//!     Ok(())
//! }
//! ```

pub mod adaptor;
pub mod backend;
pub mod board;
pub mod board_url;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod constructors;
pub mod data;
pub mod error;
pub mod meta;
pub mod version;

// Re-export commonly used types
pub use adaptor::{read_payload, Adaptor, ColumnSpec, Format};
pub use backend::{FileEntry, Filesystem, LocalFs, MemoryFs, TempBackend};
pub use board::{Board, WriteOptions};
pub use board_url::{BoardUrl, FileFetcher, UrlFetcher};
pub use cache::{AccessTimeCache, CacheHit, VersionCache};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{BoardConfig, CacheConfig, PathsConfig};
pub use constructors::{board_folder, board_folder_with, board_local, board_temp};
pub use data::{Capability, DataFrame, Payload};
pub use error::{PinboardError, Result};
pub use meta::VersionMeta;
pub use version::VersionId;
