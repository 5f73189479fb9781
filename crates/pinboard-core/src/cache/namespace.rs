//! Cache namespace derivation.
//!
//! The local cache root is partitioned per backend identity so unrelated
//! boards never share cache storage. The namespace key is a truncated
//! SHA-256 over the protocol and the normalized identity: deterministic,
//! collision-resistant, filesystem-safe (lowercase hex) and fixed-length.

use sha2::{Digest, Sha256};
use url::Url;

/// Length of the namespace key in hex characters.
const NAMESPACE_LEN: usize = 16;

/// Derive the cache namespace for a backend.
///
/// `identity` is either a base path (path-addressed backends) or a server
/// URL (server-addressed backends). Server URLs are reduced to
/// scheme + host + port, so every path on one server maps to the same
/// namespace; paths are normalized lexically so `a/b/` and `a/b` agree.
pub fn derive(protocol: &str, identity: &str) -> String {
    let normalized = normalize_identity(identity);

    let mut hasher = Sha256::new();
    hasher.update(protocol.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());

    hex::encode(hasher.finalize())[..NAMESPACE_LEN].to_string()
}

fn normalize_identity(identity: &str) -> String {
    if identity.contains("://") {
        if let Ok(url) = Url::parse(identity) {
            if let Some(host) = url.host_str() {
                return match url.port() {
                    Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                    None => format!("{}://{}", url.scheme(), host),
                };
            }
        }
    }

    // Path identity: collapse empty and `.` segments, keep absoluteness.
    let absolute = identity.starts_with('/');
    let joined = identity
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(derive("file", "/data/boards"), derive("file", "/data/boards"));
    }

    #[test]
    fn test_shape_is_fs_safe_hex() {
        let key = derive("s3", "bucket/boards");
        assert_eq!(key.len(), NAMESPACE_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_distinct_paths_distinct_namespaces() {
        assert_ne!(derive("file", "/data/a"), derive("file", "/data/b"));
    }

    #[test]
    fn test_distinct_protocols_distinct_namespaces() {
        assert_ne!(derive("file", "boards"), derive("s3", "boards"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(derive("file", "/data/boards/"), derive("file", "/data/boards"));
        assert_eq!(derive("file", "./a/b"), derive("file", "a/b"));
        assert_ne!(derive("file", "/a/b"), derive("file", "a/b"));
    }

    #[test]
    fn test_server_identity_ignores_path() {
        let a = derive("rsc", "https://example.com/content/3004");
        let b = derive("rsc", "https://example.com");
        let c = derive("rsc", "https://example.com/");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_server_identity_distinguishes_port() {
        assert_ne!(
            derive("rsc", "https://example.com:8443"),
            derive("rsc", "https://example.com")
        );
    }
}
