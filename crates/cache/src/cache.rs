//! Two-tier result cache.
//!
//! [`ResultCache::load`] resolves an artifact through three levels:
//!
//! 1. memory tier (LRU over entry count): returns the shared `Arc`;
//! 2. disk tier (gzip blobs, bounded bytes): decoded and promoted;
//! 3. the [`ArtifactParser`]: result stored in both tiers.
//!
//! Misses are single-flight per key: concurrent callers for the same key
//! wait for the first parse and then read the memory tier instead of
//! parsing again. Parses are never cancelled; a finished parse is cached
//! even if its caller has gone away.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::codec;
use crate::disk::DiskTier;
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::memory::MemoryTier;
use crate::parser::ArtifactParser;

/// Default memory tier bound (entries).
pub const DEFAULT_MEMORY_ENTRIES: usize = 32;

/// Default disk tier bound (1 GiB).
pub const DEFAULT_DISK_BYTES: u64 = 1024 * 1024 * 1024;

/// Cache sizing and placement.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of artifacts held in memory.
    pub memory_entries: usize,
    /// Disk tier directory; `None` disables the disk tier.
    pub disk_dir: Option<PathBuf>,
    /// Maximum total compressed bytes on disk.
    pub disk_max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_entries: DEFAULT_MEMORY_ENTRIES,
            disk_dir: None,
            disk_max_bytes: DEFAULT_DISK_BYTES,
        }
    }
}

/// Read-only diagnostic snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_count: usize,
    pub memory_capacity: usize,
    pub disk_count: usize,
    pub disk_bytes: u64,
    pub disk_capacity_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

type FlightLock = Arc<tokio::sync::Mutex<()>>;

pub struct ResultCache<P: ArtifactParser> {
    shared: Arc<Shared<P>>,
}

/// Cache state owned jointly by callers and in-flight resolutions.
struct Shared<P: ArtifactParser> {
    parser: Arc<P>,
    memory: MemoryTier<P::Artifact>,
    disk: Option<Arc<DiskTier>>,
    inflight: Mutex<HashMap<CacheKey, FlightLock>>,
    counters: Counters,
}

impl<P: ArtifactParser> ResultCache<P> {
    /// Build a cache, opening the disk tier if one is configured.
    pub fn open(config: CacheConfig, parser: P) -> Result<Self, CacheError> {
        let disk = match &config.disk_dir {
            Some(dir) => Some(Arc::new(DiskTier::open(dir, config.disk_max_bytes)?)),
            None => None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                parser: Arc::new(parser),
                memory: MemoryTier::new(config.memory_entries),
                disk,
                inflight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        })
    }

    /// Load the artifact for the current version of `path`.
    ///
    /// A miss is resolved on a spawned task, so dropping the returned
    /// future does not abandon the parse: its result still lands in both
    /// tiers and the flight is released.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<P::Artifact>, CacheError> {
        let key = CacheKey::for_path(path.as_ref()).await?;

        if let Some(value) = self.shared.memory_hit(&key) {
            return Ok(value);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.resolve(key).await })
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }

    /// Remove every entry for `prefix` or any path beneath it, from both
    /// tiers. Returns the number of entries removed.
    ///
    /// A prefix that no longer exists is made absolute against the current
    /// directory and normalized lexically before matching.
    pub async fn invalidate(&self, prefix: impl AsRef<Path>) -> Result<usize, CacheError> {
        let prefix = prefix.as_ref();
        let prefix = match tokio::fs::canonicalize(prefix).await {
            Ok(canonical) => canonical,
            Err(_) => absolute(prefix).map_err(|source| CacheError::Io {
                path: prefix.to_path_buf(),
                source,
            })?,
        };

        let shared = &self.shared;
        let from_memory = shared.memory.remove_where(|k| k.matches_prefix(&prefix));

        let from_disk = match &shared.disk {
            Some(disk) => {
                let disk = Arc::clone(disk);
                let prefix = prefix.clone();
                tokio::task::spawn_blocking(move || disk.remove_where(|k| k.matches_prefix(&prefix)))
                    .await
                    .map_err(|e| CacheError::Task(e.to_string()))?
            }
            None => 0,
        };

        tracing::info!(
            prefix = %prefix.display(),
            from_memory,
            from_disk,
            "Cache entries invalidated",
        );
        Ok(from_memory + from_disk)
    }

    pub fn stats(&self) -> CacheStats {
        let shared = &self.shared;
        let memory_hits = shared.counters.memory_hits.load(Ordering::Relaxed);
        let disk_hits = shared.counters.disk_hits.load(Ordering::Relaxed);
        let misses = shared.counters.misses.load(Ordering::Relaxed);
        let hits = memory_hits + disk_hits;
        let lookups = hits + misses;

        CacheStats {
            memory_count: shared.memory.len(),
            memory_capacity: shared.memory.capacity(),
            disk_count: shared.disk.as_ref().map_or(0, |d| d.len()),
            disk_bytes: shared.disk.as_ref().map_or(0, |d| d.total_bytes()),
            disk_capacity_bytes: shared.disk.as_ref().map_or(0, |d| d.max_bytes()),
            hits,
            misses,
            memory_hits,
            disk_hits,
            evictions: shared.counters.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl<P: ArtifactParser> Shared<P> {
    fn memory_hit(&self, key: &CacheKey) -> Option<Arc<P::Artifact>> {
        let value = self.memory.get(key)?;
        self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Single-flight resolution of a memory miss.
    async fn resolve(&self, key: CacheKey) -> Result<Arc<P::Artifact>, CacheError> {
        let flight = self.flight_lock(&key);
        let guard = flight.lock().await;

        // A concurrent caller may have filled the entry while we waited.
        let result = match self.memory_hit(&key) {
            Some(value) => Ok(value),
            None => self.load_uncached(&key).await,
        };

        self.finish_flight(&key, &flight);
        drop(guard);
        result
    }

    fn flight_lock(&self, key: &CacheKey) -> FlightLock {
        Arc::clone(self.inflight.lock().entry(key.clone()).or_default())
    }

    fn finish_flight(&self, key: &CacheKey, flight: &FlightLock) {
        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            inflight.remove(key);
        }
    }

    async fn load_uncached(&self, key: &CacheKey) -> Result<Arc<P::Artifact>, CacheError> {
        if let Some(value) = self.read_disk(key).await {
            self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
            let value = Arc::new(value);
            self.insert_memory(key, Arc::clone(&value));
            return Ok(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let parser = Arc::clone(&self.parser);
        let path = key.path.clone();
        let started = std::time::Instant::now();
        let value = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;
        let value = Arc::new(value);

        tracing::debug!(
            path = %key.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Artifact parsed from source",
        );

        self.insert_memory(key, Arc::clone(&value));
        self.write_disk(key, Arc::clone(&value)).await;
        Ok(value)
    }

    fn insert_memory(&self, key: &CacheKey, value: Arc<P::Artifact>) {
        let evicted = self.memory.insert(key.clone(), value);
        if !evicted.is_empty() {
            self.counters
                .evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            for key in evicted {
                tracing::debug!(path = %key.path.display(), "Memory cache entry evicted");
            }
        }
    }

    /// Disk lookups degrade to a miss on any failure.
    async fn read_disk(&self, key: &CacheKey) -> Option<P::Artifact> {
        let disk = Arc::clone(self.disk.as_ref()?);
        let key = key.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<Option<P::Artifact>, CacheError> {
            let Some(blob) = disk.read(&key)? else {
                return Ok(None);
            };
            match codec::decode::<P::Artifact>(&blob) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(path = %key.path.display(), error = %e, "Corrupt disk cache blob, discarding");
                    disk.forget(&key.digest());
                    Ok(None)
                }
            }
        })
        .await;

        match result {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Disk cache read failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Disk cache read task failed");
                None
            }
        }
    }

    /// Disk writes are best-effort; failures are logged and ignored.
    async fn write_disk(&self, key: &CacheKey, value: Arc<P::Artifact>) {
        let Some(disk) = self.disk.as_ref().map(Arc::clone) else {
            return;
        };
        let key = key.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<usize, CacheError> {
            let blob = codec::encode(&*value)?;
            disk.write(&key, &blob)
        })
        .await;

        match result {
            Ok(Ok(evicted)) => {
                self.counters
                    .evictions
                    .fetch_add(evicted as u64, Ordering::Relaxed);
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "Disk cache write failed"),
            Err(e) => tracing::warn!(error = %e, "Disk cache write task failed"),
        }
    }
}

/// Lexical absolute form of `path`: `.` dropped, `..` applied.
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let mut out = if path.is_relative() {
        std::env::current_dir()?
    } else {
        PathBuf::new()
    };
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
