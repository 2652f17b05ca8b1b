//! Bounded LRU cache of built artifacts.
//!
//! Recency is tracked with a logical clock rather than wall time, so eviction
//! order is deterministic even when two accesses share a timestamp. The
//! victim is the entry with the smallest `last_used_tick`; ties go to the
//! smallest `inserted_tick`.
//!
//! Builds for the same key are serialized with a per-key async lock. The
//! entry table itself sits behind a plain mutex that is never held across an
//! `.await`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{BuildError, CacheError, CacheResult};
use crate::key::CacheKey;

/// Name of the persistent index inside the cache directory.
pub const INDEX_FILE: &str = "index.json";

const INDEX_VERSION: u32 = 1;

/// One cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Location of the built artifact.
    pub artifact: PathBuf,
    /// Wall-clock time of the last hit or insert.
    pub last_used: DateTime<Utc>,
    pub last_used_tick: u64,
    pub inserted_tick: u64,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub build_failures: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    build_failures: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    version: u32,
    clock: u64,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Default)]
struct State {
    entries: FxHashMap<CacheKey, CacheEntry>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &CacheKey) -> Option<PathBuf> {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used_tick = tick;
        entry.last_used = Utc::now();
        Some(entry.artifact.clone())
    }

    fn evict_over(&mut self, capacity: usize) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let Some(victim) = self
                .entries
                .values()
                .min_by_key(|e| (e.last_used_tick, e.inserted_tick))
                .map(|e| e.key.clone())
            else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                evicted.push(entry);
            }
        }
        evicted
    }
}

/// Build and warm-up cache shared by every adapter of a run.
#[derive(Debug)]
pub struct BuildCache {
    capacity: usize,
    /// Cache directory; `None` for a purely in-memory cache.
    root: Option<PathBuf>,
    state: Mutex<State>,
    build_locks: Mutex<FxHashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
    counters: Counters,
}

impl BuildCache {
    /// Create an in-memory cache. Artifacts live wherever builders put them.
    pub fn in_memory(capacity: usize) -> CacheResult<Self> {
        Self::with_root(capacity, None)
    }

    /// Open (or create) a persistent cache rooted at `dir`.
    ///
    /// Entries whose artifact no longer exists are dropped while loading.
    pub async fn open(dir: impl AsRef<Path>, capacity: usize) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("builds"))
            .await
            .map_err(|e| CacheError::io(&dir, e))?;

        let cache = Self::with_root(capacity, Some(dir.clone()))?;
        let index_path = dir.join(INDEX_FILE);
        let index = match fs::read_to_string(&index_path).await {
            Ok(content) => match serde_json::from_str::<Index>(&content) {
                Ok(index) if index.version == INDEX_VERSION => Some(index),
                Ok(index) => {
                    warn!(version = index.version, "ignoring cache index with unknown version");
                    None
                }
                Err(e) => {
                    warn!("Failed to parse cache index {:?}: {}", index_path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::io(index_path, e)),
        };

        let evicted = {
            let mut state = cache.lock_state();
            if let Some(index) = index {
                state.clock = index.clock;
                for entry in index.entries {
                    if entry.artifact.exists() {
                        state.entries.insert(entry.key.clone(), entry);
                    } else {
                        debug!(key = %entry.key, "dropping cache entry with missing artifact");
                    }
                }
            }
            state.evict_over(capacity)
        };
        cache.remove_build_dirs(&evicted).await;
        info!(dir = %dir.display(), entries = cache.len(), capacity, "opened build cache");
        Ok(cache)
    }

    fn with_root(capacity: usize, root: Option<PathBuf>) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            root,
            state: Mutex::new(State::default()),
            build_locks: Mutex::new(FxHashMap::default()),
            counters: Counters::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this cache writes an index to disk.
    pub fn is_persistent(&self) -> bool {
        self.root.is_some()
    }

    /// Directory a builder should use for `key`.
    ///
    /// Persistent caches own `<dir>/builds/<key>`; in-memory caches hand out
    /// a directory under the system temp dir.
    pub fn build_dir(&self, key: &CacheKey) -> PathBuf {
        match &self.root {
            Some(root) => root.join("builds").join(key.as_str()),
            None => std::env::temp_dir()
                .join("qasmbench-builds")
                .join(key.as_str()),
        }
    }

    /// Whether `key` is cached. Does not affect recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock_state().entries.contains_key(key)
    }

    /// Snapshot of one entry. Does not affect recency.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock_state().entries.get(key).cloned()
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<CacheKey> {
        let state = self.lock_state();
        let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
        entries.sort_by_key(|e| (e.last_used_tick, e.inserted_tick));
        entries.into_iter().map(|e| e.key.clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            build_failures: self.counters.build_failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    ///
    /// An entry whose artifact has vanished from disk is removed and
    /// reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let mut state = self.lock_state();
        let artifact = state.touch(key)?;
        if artifact.exists() {
            Some(artifact)
        } else {
            warn!(%key, artifact = %artifact.display(), "cached artifact vanished");
            state.entries.remove(key);
            None
        }
    }

    /// Insert or replace an entry, evicting least recently used entries
    /// beyond capacity. Returns what was evicted.
    pub fn insert(&self, key: CacheKey, artifact: PathBuf) -> Vec<CacheEntry> {
        let mut state = self.lock_state();
        let tick = state.tick();
        let inserted_tick = state
            .entries
            .get(&key)
            .map_or(tick, |existing| existing.inserted_tick);
        state.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                artifact,
                last_used: Utc::now(),
                last_used_tick: tick,
                inserted_tick,
            },
        );
        let evicted = state.evict_over(self.capacity);
        self.counters
            .evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        for entry in &evicted {
            debug!(key = %entry.key, "evicted cache entry");
        }
        evicted
    }

    /// Return the artifact for `key`, running `build` on a miss.
    ///
    /// At most one build per key is in flight; concurrent callers for the
    /// same key wait for it and then observe the hit. A failed build is not
    /// cached.
    pub async fn get_or_build<F, Fut>(&self, key: &CacheKey, build: F) -> CacheResult<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, BuildError>>,
    {
        if let Some(artifact) = self.get(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "cache hit");
            return Ok(artifact);
        }

        let lock = self.build_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.build_locked(key, build).await
        };
        self.release_build_lock(key, lock);
        result
    }

    async fn build_locked<F, Fut>(&self, key: &CacheKey, build: F) -> CacheResult<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, BuildError>>,
    {
        // Another caller may have finished the build while we waited.
        if let Some(artifact) = self.get(key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "cache hit after waiting for build");
            return Ok(artifact);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        info!(%key, "cache miss, building");
        let artifact = match build().await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.counters.build_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %e, "build failed");
                return Err(e.into());
            }
        };
        self.counters.builds.fetch_add(1, Ordering::Relaxed);

        let evicted = self.insert(key.clone(), artifact.clone());
        self.remove_build_dirs(&evicted).await;
        // The artifact is cached either way; the index is rewritten on the
        // next successful persist.
        if let Err(e) = self.persist().await {
            warn!(%key, error = %e, "could not persist cache index");
        }
        Ok(artifact)
    }

    /// Write the index to disk. No-op for in-memory caches.
    pub async fn persist(&self) -> CacheResult<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let index = {
            let state = self.lock_state();
            let mut entries: Vec<CacheEntry> = state.entries.values().cloned().collect();
            entries.sort_by_key(|e| e.inserted_tick);
            Index {
                version: INDEX_VERSION,
                clock: state.clock,
                entries,
            }
        };
        let json = serde_json::to_string_pretty(&index)?;

        let path = root.join(INDEX_FILE);
        let tmp = root.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, json)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        Ok(())
    }

    fn build_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the per-key lock once no other caller holds or waits on it.
    fn release_build_lock(&self, key: &CacheKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn remove_build_dirs(&self, evicted: &[CacheEntry]) {
        if self.root.is_none() {
            return;
        }
        for entry in evicted {
            let dir = self.build_dir(&entry.key);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "removed evicted build dir"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(dir = %dir.display(), "Failed to remove build dir: {e}"),
            }
        }
    }
}
