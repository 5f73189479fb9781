//! Local cache layer.
//!
//! Two policies share one on-disk root, separated by namespace directories
//! derived in [`namespace`]:
//!
//! * [`VersionCache`] for version-addressed entries, which are immutable once
//!   materialized and never expire by time.
//! * [`AccessTimeCache`] for URL-addressed entries with no version identity,
//!   evicted least-recently-accessed first.

pub mod access_time;
pub mod namespace;
pub mod pinned;

pub use access_time::AccessTimeCache;
pub use pinned::{CacheHit, VersionCache};
