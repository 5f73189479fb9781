//! Per-version manifest persistence.
//!
//! Every version directory carries a `manifest.json` recording the format,
//! title, description, file list with total size, column descriptors for
//! tabular payloads, and the stored preview. The manifest is written last
//! during a version write so a reader never sees a version without one.

use crate::adaptor::{ColumnSpec, Format};
use crate::error::{PinboardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest schema version.
const API_VERSION: u32 = 1;

/// Metadata stored alongside one pin version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Pin name this version belongs to.
    pub name: String,
    /// Human-readable title; defaults to the adaptor-generated title.
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Serialization format of the data file(s).
    #[serde(rename = "type")]
    pub format: Format,
    /// Data filenames relative to the version directory (manifest excluded).
    pub files: Vec<String>,
    /// Total size of the data files in bytes.
    pub file_size: u64,
    /// Full manifest hash; the version id carries a truncated copy.
    pub pin_hash: String,
    /// Creation instant.
    pub created: DateTime<Utc>,
    /// Column descriptors; present only for tabular payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnSpec>>,
    /// Stored preview document (see `Adaptor::preview`).
    pub preview: String,
    /// Manifest schema version.
    pub api_version: u32,
}

impl VersionMeta {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        format: Format,
        files: Vec<String>,
        file_size: u64,
        pin_hash: impl Into<String>,
        created: DateTime<Utc>,
        columns: Option<Vec<ColumnSpec>>,
        preview: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description,
            format,
            files,
            file_size,
            pin_hash: pin_hash.into(),
            created,
            columns,
            preview: preview.into(),
            api_version: API_VERSION,
        }
    }

    /// The primary data filename.
    pub fn data_file(&self) -> Result<&str> {
        self.files
            .first()
            .map(String::as_str)
            .ok_or_else(|| PinboardError::ManifestCorrupt {
                name: self.name.clone(),
                version: String::new(),
                message: "manifest lists no data files".to_string(),
            })
    }

    /// Column names, when the stored payload was tabular.
    pub fn column_names(&self) -> Option<Vec<String>> {
        self.columns
            .as_ref()
            .map(|specs| specs.iter().map(|c| c.name.clone()).collect())
    }

    /// Serialize for storage. Pretty-printed so manifests stay inspectable
    /// with ordinary tools.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a stored manifest. A parse failure is surfaced as
    /// [`PinboardError::ManifestCorrupt`] and never silently repaired.
    pub fn from_bytes(bytes: &[u8], name: &str, version: &str) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PinboardError::ManifestCorrupt {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_meta() -> VersionMeta {
        VersionMeta::new(
            "df_csv",
            "df_csv: a pinned 3 x 2 DataFrame",
            Some("test frame".to_string()),
            Format::Csv,
            vec!["df_csv.csv".to_string()],
            24,
            "9bfad0123456789abcdef0123456789abcdef0123456789abcdef0123456789a",
            Utc.with_ymd_and_hms(2022, 2, 14, 16, 37, 20).unwrap(),
            None,
            "{}",
        )
    }

    #[test]
    fn test_roundtrip() {
        let meta = sample_meta();
        let bytes = meta.to_bytes().unwrap();
        let back = VersionMeta::from_bytes(&bytes, "df_csv", "v1").unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_format_serialized_as_type_tag() {
        let bytes = sample_meta().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "csv");
    }

    #[test]
    fn test_corrupt_manifest_surfaces() {
        let err =
            VersionMeta::from_bytes(b"{ not json", "df_csv", "20220214T163720Z-9bfad")
                .unwrap_err();
        match err {
            PinboardError::ManifestCorrupt { name, version, .. } => {
                assert_eq!(name, "df_csv");
                assert_eq!(version, "20220214T163720Z-9bfad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_data_file() {
        assert_eq!(sample_meta().data_file().unwrap(), "df_csv.csv");

        let mut empty = sample_meta();
        empty.files.clear();
        assert!(empty.data_file().is_err());
    }
}
