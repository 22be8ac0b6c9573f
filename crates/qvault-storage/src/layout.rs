//! On-disk repository layout for a storage-host's copy of a vault:
//! `<base>/{data/XX/<sha>, keys/<sha>, snapshots/<id>, index/<id>, config}`.
//!
//! `data/` and `keys/` are content-addressed: the terminal path component
//! must equal the SHA-256 hex digest of the blob's bytes. Everything else
//! is addressed by caller-supplied id and is not hash-checked.

use std::path::{Path, PathBuf};

use qvault_core::constants::BLOB_PREFIX_LEN;
use qvault_crypto::hash::sha256_hex;

use crate::error::StorageError;

/// A validated, repo-relative blob path split into its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPath {
    /// Path relative to the repo root, using `/` separators, no leading slash.
    pub relative: String,
}

impl BlobPath {
    /// Parses and validates a caller-supplied path. Rejects empty paths,
    /// absolute paths, and any `.`/`..` component (directory traversal).
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let trimmed = raw.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::BadPath("empty path".into()));
        }
        for part in trimmed.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StorageError::BadPath(raw.to_string()));
            }
        }
        Ok(BlobPath {
            relative: trimmed.to_string(),
        })
    }

    /// True if this path falls under a content-addressed subtree (`data/`
    /// or `keys/`), where the terminal component must hash-match the body.
    pub fn is_content_addressed(&self) -> bool {
        matches!(self.top_level(), "data" | "keys")
    }

    fn top_level(&self) -> &str {
        self.relative.split('/').next().unwrap_or("")
    }

    pub fn terminal_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        base.join(&self.relative)
    }
}

/// Verifies that a blob path's terminal name matches the SHA-256 hex of
/// `contents`, when the path falls under a content-addressed subtree.
pub fn verify_content_address(path: &BlobPath, contents: &[u8]) -> Result<(), StorageError> {
    if !path.is_content_addressed() {
        return Ok(());
    }
    let got = sha256_hex(contents);
    let expected = path.terminal_name();
    if expected != got {
        return Err(StorageError::HashMismatch {
            expected: expected.to_string(),
            got,
        });
    }
    Ok(())
}

/// Builds the two-character-prefixed data path `data/<xx>/<sha>` for a blob
/// keyed by its content hash, matching the layout described above.
pub fn data_blob_path(sha_hex: &str) -> String {
    let prefix_len = BLOB_PREFIX_LEN.min(sha_hex.len());
    format!("data/{}/{}", &sha_hex[..prefix_len], sha_hex)
}

pub fn keys_blob_path(sha_hex: &str) -> String {
    format!("keys/{}", sha_hex)
}

pub fn config_path() -> &'static str {
    "config"
}

pub fn snapshot_path(snapshot_id: &str) -> String {
    format!("snapshots/{}", snapshot_id)
}

pub fn index_path(index_id: &str) -> String {
    format!("index/{}", index_id)
}

/// Recursively sums the byte size of every regular file under `base`, used
/// to revalidate the quota counter from disk at startup.
pub fn scan_used_bytes(base: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    if !base.exists() {
        return Ok(0);
    }
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else if meta.is_file() {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_empty() {
        assert!(BlobPath::parse("").is_err());
        assert!(BlobPath::parse("../etc/passwd").is_err());
        assert!(BlobPath::parse("data/../keys/abc").is_err());
        assert!(BlobPath::parse("data/ab/abc").is_ok());
    }

    #[test]
    fn content_addressed_subtrees() {
        let data = BlobPath::parse("data/ab/abc").unwrap();
        let keys = BlobPath::parse("keys/abc").unwrap();
        let config = BlobPath::parse("config").unwrap();
        assert!(data.is_content_addressed());
        assert!(keys.is_content_addressed());
        assert!(!config.is_content_addressed());
    }

    #[test]
    fn hash_mismatch_rejected() {
        let body = b"hello world";
        let good = sha256_hex(body);
        let path_ok = BlobPath::parse(&data_blob_path(&good)).unwrap();
        assert!(verify_content_address(&path_ok, body).is_ok());

        let path_bad = BlobPath::parse("data/ff/ffffffff").unwrap();
        assert!(verify_content_address(&path_bad, body).is_err());
    }

    #[test]
    fn scans_nested_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/ab")).unwrap();
        std::fs::write(dir.path().join("data/ab/one"), b"1234").unwrap();
        std::fs::write(dir.path().join("config"), b"12345678").unwrap();
        assert_eq!(scan_used_bytes(dir.path()).unwrap(), 12);
    }
}
