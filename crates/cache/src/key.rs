//! Cache keys.
//!
//! A key pins an artifact to one exact version of its source file: the
//! canonical path plus the file's modification time and size. Rewriting
//! the file changes the key, so stale entries are never returned; they
//! simply stop being looked up and age out through eviction.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Canonical absolute path of the source file.
    pub path: PathBuf,
    /// Last-modified time in nanoseconds since the Unix epoch.
    pub modified_ns: u64,
    /// File size in bytes.
    pub size: u64,
}

impl CacheKey {
    /// Build the key for the current version of the file at `path`.
    pub async fn for_path(path: &Path) -> Result<Self, CacheError> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| CacheError::io(path, e))?;
        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| CacheError::io(&canonical, e))?;

        if !metadata.is_file() {
            return Err(CacheError::NotFound(canonical));
        }

        let modified_ns = metadata
            .modified()
            .map_err(|e| CacheError::io(&canonical, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        Ok(Self {
            path: canonical,
            modified_ns,
            size: metadata.len(),
        })
    }

    /// Whether this key's path is `prefix` itself or lies beneath it.
    ///
    /// Matching is per path component, so `/data/net` does not match
    /// `/data/network.json`.
    pub fn matches_prefix(&self, prefix: &Path) -> bool {
        self.path.starts_with(prefix)
    }

    /// Stable hex digest used to name the key's disk blob.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.modified_ns.to_le_bytes());
        hasher.update(self.size.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
