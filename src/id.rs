//! ID and digest utilities for Telos
//!
//! Build IDs isolate runs from each other; instruction digests let the
//! orchestrator recognise a delegation it has already sent.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Hex-encoded sha256 of arbitrary text
pub fn digest(text: &str) -> String {
    digest_bytes(text.as_bytes())
}

/// Hex-encoded sha256 of raw bytes, e.g. file content
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Generate a build ID for a project directory
///
/// Format: `{timestamp_ms}-{first 8 hex chars of sha256(project_dir)}`
/// Example: `1738300800123-9f86d081`
pub fn generate_build_id(project_dir: &Path) -> String {
    let path_digest = digest(&project_dir.to_string_lossy());
    format!("{}-{}", now_ms(), &path_digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generate_build_id_format() {
        let id = generate_build_id(Path::new("/tmp/project"));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_build_id_suffix_depends_on_project() {
        let a = generate_build_id(Path::new("/tmp/a"));
        let b = generate_build_id(Path::new("/tmp/b"));
        assert_ne!(a.split('-').nth(1), b.split('-').nth(1));
    }
}
