//! On-disk tier: gzip blobs bounded by total compressed size.
//!
//! Each entry is stored as `<digest>.gz` in the cache directory. An index
//! ordered by write time tracks sizes for space accounting and is
//! persisted to `manifest.json` so the tier survives restarts. When the
//! byte bound is exceeded the oldest-written blobs are deleted first.
//!
//! All methods perform blocking file I/O; async callers run them on the
//! blocking pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::key::CacheKey;

const MANIFEST_FILE: &str = "manifest.json";
const BLOB_EXTENSION: &str = "gz";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry {
    key: CacheKey,
    bytes: u64,
    written_at: DateTime<Utc>,
}

#[derive(Default)]
struct DiskIndex {
    /// Digest -> entry, oldest write first.
    entries: IndexMap<String, DiskEntry>,
    total_bytes: u64,
}

pub struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<DiskIndex>,
}

impl DiskTier {
    /// Open (or create) the tier rooted at `dir`.
    ///
    /// Reconciles the manifest with the directory contents: entries whose
    /// blob is gone are dropped and blobs missing from the manifest are
    /// deleted. A corrupt manifest starts the tier empty.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let mut entries = load_manifest(&dir);
        entries.retain(|digest, entry| match fs::metadata(blob_path(&dir, digest)) {
            Ok(meta) => {
                entry.bytes = meta.len();
                true
            }
            Err(_) => false,
        });

        remove_orphan_blobs(&dir, &entries);

        let total_bytes = entries.values().map(|e| e.bytes).sum();
        let tier = Self {
            dir,
            max_bytes,
            index: Mutex::new(DiskIndex {
                entries,
                total_bytes,
            }),
        };

        {
            let mut index = tier.index.lock();
            tier.evict_over_budget(&mut index);
            tier.save_manifest(&index);
            tracing::info!(
                dir = %tier.dir.display(),
                entries = index.entries.len(),
                bytes = index.total_bytes,
                "Disk cache tier opened",
            );
        }

        Ok(tier)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Read the compressed blob for `key`, if present.
    pub fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let digest = key.digest();
        if !self.index.lock().entries.contains_key(&digest) {
            return Ok(None);
        }

        let path = blob_path(&self.dir, &digest);
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Disk cache blob vanished, dropping entry");
                self.forget(&digest);
                Ok(None)
            }
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    /// Store `blob` for `key` as the newest entry, then evict the
    /// oldest-written entries until the tier fits its byte bound.
    ///
    /// Returns the number of entries evicted. Blobs larger than the whole
    /// bound are not stored.
    pub fn write(&self, key: &CacheKey, blob: &[u8]) -> Result<usize, CacheError> {
        let bytes = blob.len() as u64;
        if bytes > self.max_bytes {
            tracing::debug!(
                path = %key.path.display(),
                bytes,
                max_bytes = self.max_bytes,
                "Artifact exceeds disk cache bound, not stored",
            );
            return Ok(0);
        }

        let digest = key.digest();
        let path = blob_path(&self.dir, &digest);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, blob).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))?;

        let mut index = self.index.lock();
        if let Some(previous) = index.entries.shift_remove(&digest) {
            index.total_bytes -= previous.bytes;
        }
        index.entries.insert(
            digest,
            DiskEntry {
                key: key.clone(),
                bytes,
                written_at: Utc::now(),
            },
        );
        index.total_bytes += bytes;

        let evicted = self.evict_over_budget(&mut index);
        self.save_manifest(&index);
        Ok(evicted)
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut index = self.index.lock();
        let doomed: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.key))
            .map(|(digest, _)| digest.clone())
            .collect();

        for digest in &doomed {
            if let Some(entry) = index.entries.shift_remove(digest) {
                index.total_bytes -= entry.bytes;
                self.delete_blob(digest);
            }
        }
        if !doomed.is_empty() {
            self.save_manifest(&index);
        }
        doomed.len()
    }

    /// Drop an entry whose blob turned out to be unusable.
    pub fn forget(&self, digest: &str) {
        let mut index = self.index.lock();
        if let Some(entry) = index.entries.shift_remove(digest) {
            index.total_bytes -= entry.bytes;
            self.delete_blob(digest);
            self.save_manifest(&index);
        }
    }

    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.index.lock().total_bytes
    }

    // ---- private helpers ----

    fn evict_over_budget(&self, index: &mut DiskIndex) -> usize {
        let mut evicted = 0;
        while index.total_bytes > self.max_bytes {
            let Some((digest, entry)) = index.entries.shift_remove_index(0) else {
                break;
            };
            index.total_bytes -= entry.bytes;
            self.delete_blob(&digest);
            evicted += 1;
            tracing::debug!(path = %entry.key.path.display(), bytes = entry.bytes, "Disk cache entry evicted");
        }
        evicted
    }

    fn delete_blob(&self, digest: &str) {
        let path = blob_path(&self.dir, digest);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete cache blob");
            }
        }
    }

    fn save_manifest(&self, index: &DiskIndex) {
        let path = self.dir.join(MANIFEST_FILE);
        let tmp = path.with_extension("json.tmp");
        let result = serde_json::to_vec(&index.entries)
            .map_err(std::io::Error::other)
            .and_then(|json| fs::write(&tmp, json))
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write cache manifest");
        }
    }
}

fn blob_path(dir: &Path, digest: &str) -> PathBuf {
    dir.join(format!("{digest}.{BLOB_EXTENSION}"))
}

fn load_manifest(dir: &Path) -> IndexMap<String, DiskEntry> {
    let path = dir.join(MANIFEST_FILE);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt cache manifest, starting empty");
            IndexMap::new()
        }),
        Err(_) => IndexMap::new(),
    }
}

fn remove_orphan_blobs(dir: &Path, entries: &IndexMap<String, DiskEntry>) {
    let Ok(listing) = fs::read_dir(dir) else {
        return;
    };
    for entry in listing.flatten() {
        let path = entry.path();
        let is_blob = path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXTENSION);
        let is_tmp = path.extension().and_then(|e| e.to_str()) == Some("tmp");
        let known = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| entries.contains_key(stem));
        if is_tmp || (is_blob && !known) {
            let _ = fs::remove_file(&path);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey {
            path: PathBuf::from(format!("/data/{name}")),
            modified_ns: 1,
            size: 1,
        }
    }

    #[test]
    fn write_then_read_returns_blob() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path(), 1024).unwrap();

        tier.write(&key("a"), b"blob-a").unwrap();

        assert_eq!(tier.read(&key("a")).unwrap().as_deref(), Some(&b"blob-a"[..]));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.total_bytes(), 6);
        assert!(tier.read(&key("b")).unwrap().is_none());
    }

    #[test]
    fn evicts_oldest_written_when_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path(), 10).unwrap();

        tier.write(&key("a"), &[0; 4]).unwrap();
        tier.write(&key("b"), &[0; 4]).unwrap();
        let evicted = tier.write(&key("c"), &[0; 4]).unwrap();

        assert_eq!(evicted, 1);
        assert!(tier.read(&key("a")).unwrap().is_none());
        assert!(tier.read(&key("b")).unwrap().is_some());
        assert!(tier.read(&key("c")).unwrap().is_some());
        assert_eq!(tier.total_bytes(), 8);
        assert!(!blob_path(dir.path(), &key("a").digest()).exists());
    }

    #[test]
    fn oversized_blob_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path(), 4).unwrap();
        tier.write(&key("big"), &[0; 5]).unwrap();
        assert!(tier.is_empty());
    }

    #[test]
    fn rewrite_replaces_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path(), 100).unwrap();
        tier.write(&key("a"), &[0; 10]).unwrap();
        tier.write(&key("a"), &[0; 3]).unwrap();
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.total_bytes(), 3);
    }

    #[test]
    fn survives_reopen_and_drops_orphans() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tier = DiskTier::open(dir.path(), 1024).unwrap();
            tier.write(&key("a"), b"persisted").unwrap();
        }
        std::fs::write(dir.path().join("deadbeef.gz"), b"orphan").unwrap();

        let tier = DiskTier::open(dir.path(), 1024).unwrap();
        assert_eq!(tier.read(&key("a")).unwrap().as_deref(), Some(&b"persisted"[..]));
        assert_eq!(tier.len(), 1);
        assert!(!dir.path().join("deadbeef.gz").exists());
    }

    #[test]
    fn reopen_forgets_entries_with_missing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tier = DiskTier::open(dir.path(), 1024).unwrap();
            tier.write(&key("a"), b"gone soon").unwrap();
        }
        std::fs::remove_file(blob_path(dir.path(), &key("a").digest())).unwrap();

        let tier = DiskTier::open(dir.path(), 1024).unwrap();
        assert!(tier.is_empty());
        assert_eq!(tier.total_bytes(), 0);
    }

    #[test]
    fn remove_where_deletes_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::open(dir.path(), 1024).unwrap();
        tier.write(&key("keep"), b"1").unwrap();
        tier.write(&key("drop"), b"2").unwrap();

        let removed = tier.remove_where(|k| k.path.ends_with("drop"));

        assert_eq!(removed, 1);
        assert_eq!(tier.len(), 1);
        assert!(!blob_path(dir.path(), &key("drop").digest()).exists());
    }
}
