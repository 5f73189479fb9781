//! Version identifiers for pin snapshots.
//!
//! A version is identified by a compact UTC timestamp (second resolution)
//! plus a short hash of the version's file manifest, rendered as
//! `20220214T163720Z-9bfad`. Ordering is by timestamp; the hash only
//! disambiguates identity and breaks ties so the order stays total.

use crate::error::{PinboardError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Timestamp rendering used in the canonical string form.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Length of the manifest hash fragment in the canonical string form.
const HASH_LEN: usize = 5;

/// Identity of one immutable pin version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    timestamp: DateTime<Utc>,
    hash: String,
}

impl VersionId {
    /// Derive a version identifier for a new snapshot.
    ///
    /// The hash covers the file manifest (names and sizes) plus the
    /// full-precision creation instant, so two snapshots written within the
    /// same second still get distinct identifiers.
    ///
    /// Fails with [`PinboardError::EmptyManifest`] when `manifest` is empty:
    /// a version with no files is never valid.
    pub fn new(now: DateTime<Utc>, manifest: &[(String, u64)]) -> Result<Self> {
        Ok(Self::new_with_digest(now, manifest)?.0)
    }

    /// Like [`VersionId::new`], also returning the full manifest digest the
    /// identifier's hash fragment was cut from. The full digest is stored in
    /// the version manifest.
    pub fn new_with_digest(
        now: DateTime<Utc>,
        manifest: &[(String, u64)],
    ) -> Result<(Self, String)> {
        if manifest.is_empty() {
            return Err(PinboardError::EmptyManifest);
        }

        let mut hasher = Sha256::new();
        for (name, size) in manifest {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(size.to_le_bytes());
        }
        hasher.update(
            now.timestamp_nanos_opt()
                .unwrap_or_else(|| now.timestamp())
                .to_le_bytes(),
        );

        let digest = hex::encode(hasher.finalize());
        let id = Self {
            // Truncate to second resolution so Display/parse round-trips.
            timestamp: now.with_nanosecond_zeroed(),
            hash: digest[..HASH_LEN].to_string(),
        };
        Ok((id, digest))
    }

    /// Parse the canonical `<timestamp>-<hash>` form, rejecting anything
    /// malformed.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| PinboardError::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (ts_part, hash_part) = input
            .split_once('-')
            .ok_or_else(|| invalid("expected '<timestamp>-<hash>'"))?;

        let naive = NaiveDateTime::parse_from_str(ts_part, TIMESTAMP_FORMAT)
            .map_err(|_| invalid("malformed timestamp"))?;

        if hash_part.len() != HASH_LEN {
            return Err(invalid("hash must be 5 characters"));
        }
        if !hash_part
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(invalid("hash must be lowercase hex"));
        }

        Ok(Self {
            timestamp: naive.and_utc(),
            hash: hash_part.to_string(),
        })
    }

    /// The version's creation instant (second resolution).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The manifest hash fragment.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.hash
        )
    }
}

impl FromStr for VersionId {
    type Err = PinboardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Order by timestamp first; hash compare keeps the order total when two
// versions somehow share a second.
impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionId::parse(&s).map_err(D::Error::custom)
    }
}

/// Second-resolution truncation helper.
trait NanosecondZeroed {
    fn with_nanosecond_zeroed(self) -> Self;
}

impl NanosecondZeroed for DateTime<Utc> {
    fn with_nanosecond_zeroed(self) -> Self {
        DateTime::from_timestamp(self.timestamp(), 0).unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manifest() -> Vec<(String, u64)> {
        vec![("df_csv.csv".to_string(), 24), ("manifest.json".to_string(), 210)]
    }

    #[test]
    fn test_new_renders_canonical_form() {
        let now = Utc.with_ymd_and_hms(2022, 2, 14, 16, 37, 20).unwrap();
        let version = VersionId::new(now, &manifest()).unwrap();

        let rendered = version.to_string();
        assert!(rendered.starts_with("20220214T163720Z-"));
        assert_eq!(rendered.len(), "20220214T163720Z".len() + 1 + 5);
    }

    #[test]
    fn test_new_empty_manifest_fails() {
        let err = VersionId::new(Utc::now(), &[]).unwrap_err();
        assert!(matches!(err, PinboardError::EmptyManifest));
    }

    #[test]
    fn test_parse_roundtrip() {
        let version = VersionId::parse("20220214T163720Z-9bfad").unwrap();
        assert_eq!(version.to_string(), "20220214T163720Z-9bfad");
        assert_eq!(version.hash(), "9bfad");
        assert_eq!(
            version.timestamp(),
            Utc.with_ymd_and_hms(2022, 2, 14, 16, 37, 20).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "",
            "20220214T163720Z",          // no hash
            "20220214T163720Z-",         // empty hash
            "20220214T163720Z-9bfa",     // short hash
            "20220214T163720Z-9bfad1",   // long hash
            "20220214T163720Z-9BFAD",    // uppercase hash
            "20220214T163720Z-9bfzg",    // non-hex hash
            "2022-02-14T163720Z-9bfad",  // wrong timestamp shape
            "20221402T163720Z-9bfad",    // month out of range
            "garbage-9bfad",
        ] {
            assert!(VersionId::parse(input).is_err(), "accepted: {input}");
        }
    }

    #[test]
    fn test_ordering_by_timestamp() {
        let earlier = VersionId::parse("20220214T163720Z-fffff").unwrap();
        let later = VersionId::parse("20220215T000000Z-00000").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_ordering_tie_broken_by_hash() {
        let a = VersionId::parse("20220214T163720Z-0aaaa").unwrap();
        let b = VersionId::parse("20220214T163720Z-0bbbb").unwrap();
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_second_different_manifests_differ() {
        let now = Utc.with_ymd_and_hms(2022, 2, 14, 16, 37, 20).unwrap();
        let v1 = VersionId::new(now, &[("a.csv".to_string(), 10)]).unwrap();
        let v2 = VersionId::new(now, &[("a.csv".to_string(), 11)]).unwrap();
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_digest_prefix_matches_hash() {
        let now = Utc.with_ymd_and_hms(2022, 2, 14, 16, 37, 20).unwrap();
        let (version, digest) = VersionId::new_with_digest(now, &manifest()).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.starts_with(version.hash()));
    }

    #[test]
    fn test_serde_as_string() {
        let version = VersionId::parse("20220214T163720Z-9bfad").unwrap();
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"20220214T163720Z-9bfad\"");

        let back: VersionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);

        assert!(serde_json::from_str::<VersionId>("\"not-a-version\"").is_err());
    }
}
