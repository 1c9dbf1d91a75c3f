//! Indicator cache: bounded memoization of indicator/signal tables.
//!
//! Entries are keyed by (ticker, interval, strategy fingerprint). A lookup hits
//! only when the stored fingerprint matches exactly and the stored watermark is
//! at least as new as the caller's source watermark; every other outcome is a
//! miss, never an error and never a stale table.
//!
//! After each insert the cache purges TTL-expired entries, then evicts
//! least-recently-used entries until both the entry-count and the byte-size
//! limits hold. Failures to delete evicted files (another process already
//! removed them, a reader holds them open) are logged at debug level and
//! otherwise ignored: the in-memory index is authoritative.

pub mod lru;
pub mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Frame, FrameError};
use crate::fingerprint::{CacheKey, Fingerprint, Watermark};

pub use lru::LruIndex;
pub use store::{EntryMeta, MemoryStore, ParquetStore, TableStore};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("cache metadata error: {0}")]
    Metadata(String),

    #[error("cached table is malformed: {0}")]
    Frame(#[from] FrameError),
}

/// Limits applied after every insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_size_bytes: u64,
    /// Entries older than this are expired. Zero disables expiry.
    pub ttl_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            max_size_bytes: 1024 * 1024 * 1024,
            ttl_days: 30,
        }
    }
}

/// Source of "now" in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Watermark::from_system_time(std::time::SystemTime::now()).0
    }
}

/// Clock moved by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn at(secs: i64) -> Self {
        Self(Arc::new(AtomicI64::new(secs)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(days * SECS_PER_DAY);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    /// Age of the oldest entry in seconds, `None` when empty.
    pub oldest_age_secs: Option<i64>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache handle shared by every run of a sweep.
pub type SharedCache = Arc<Mutex<IndicatorCache>>;

pub struct IndicatorCache {
    config: CacheConfig,
    store: Box<dyn TableStore>,
    clock: Box<dyn Clock>,
    index: LruIndex<CacheKey, EntryMeta>,
    total_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl std::fmt::Debug for IndicatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorCache")
            .field("config", &self.config)
            .field("entries", &self.index.len())
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

impl IndicatorCache {
    /// Open a cache over `store`, reloading its persisted index.
    pub fn open(config: CacheConfig, store: impl TableStore + 'static) -> Result<Self, CacheError> {
        Self::with_clock(config, store, SystemClock)
    }

    /// Open with an explicit clock.
    pub fn with_clock(
        config: CacheConfig,
        store: impl TableStore + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self, CacheError> {
        let mut cache = Self {
            config,
            store: Box::new(store),
            clock: Box::new(clock),
            index: LruIndex::new(),
            total_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        };
        for meta in cache.store.load_index()? {
            if !cache.store.exists(&meta.key) {
                debug!(key = %meta.key, "dropping index record without a table");
                continue;
            }
            cache.total_bytes += meta.size_bytes;
            if let Some(old) = cache.index.insert(meta.key.clone(), meta) {
                cache.total_bytes -= old.size_bytes;
            }
        }
        debug!(
            entries = cache.index.len(),
            bytes = cache.total_bytes,
            "indicator cache opened"
        );
        Ok(cache)
    }

    /// In-memory cache, used when no cache directory is configured.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self {
            config,
            store: Box::new(MemoryStore::new()),
            clock: Box::new(SystemClock),
            index: LruIndex::new(),
            total_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Wrap into the handle shared across runs.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains(key)
    }

    /// Keys from most- to least-recently-used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.index.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Look up a table. Promotes the entry on a hit.
    pub fn get(
        &mut self,
        ticker: &str,
        interval: &str,
        fingerprint: &Fingerprint,
        source: Watermark,
    ) -> Option<Frame> {
        let key = CacheKey::new(ticker, interval, fingerprint);
        let now = self.clock.now();

        let Some(meta) = self.index.peek(&key) else {
            return self.miss(&key, "absent");
        };
        if &meta.fingerprint != fingerprint {
            return self.miss(&key, "fingerprint mismatch");
        }
        if source > meta.watermark {
            return self.miss(&key, "source newer than entry");
        }
        if self.is_expired(meta, now) {
            return self.miss(&key, "expired");
        }
        let expected_rows = meta.row_count;

        match self.store.read(&key) {
            Ok(Some(frame)) if frame.len() == expected_rows => {
                self.index.touch(&key);
                self.hits += 1;
                debug!(ticker, interval, key = %key, "cache hit");
                Some(frame)
            }
            Ok(Some(_)) => {
                self.forget(&key);
                self.miss(&key, "row count mismatch")
            }
            Ok(None) => {
                self.forget(&key);
                self.miss(&key, "table removed concurrently")
            }
            Err(e) => {
                debug!(key = %key, error = %e, "unreadable cache table");
                self.forget(&key);
                self.miss(&key, "unreadable")
            }
        }
    }

    /// Store a table, then enforce TTL, count and size limits.
    pub fn set(
        &mut self,
        ticker: &str,
        interval: &str,
        fingerprint: &Fingerprint,
        watermark: Watermark,
        frame: &Frame,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(ticker, interval, fingerprint);
        let mut meta = EntryMeta {
            key: key.clone(),
            ticker: ticker.to_string(),
            interval: interval.to_string(),
            fingerprint: fingerprint.clone(),
            watermark,
            row_count: frame.len(),
            created_at: self.clock.now(),
            size_bytes: 0,
        };
        meta.size_bytes = self.store.write(&meta, frame)?;

        self.total_bytes += meta.size_bytes;
        if let Some(old) = self.index.insert(key.clone(), meta) {
            self.total_bytes = self.total_bytes.saturating_sub(old.size_bytes);
        }
        debug!(ticker, interval, key = %key, "cache set");

        self.evict();
        self.persist_index()
    }

    /// Remove every entry matching the given ticker and/or interval (`None`
    /// matches anything). Returns the number removed.
    pub fn invalidate(&mut self, ticker: Option<&str>, interval: Option<&str>) -> usize {
        let doomed: Vec<CacheKey> = self
            .index
            .iter()
            .filter(|(_, m)| {
                ticker.map_or(true, |t| m.ticker == t) && interval.map_or(true, |i| m.interval == i)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.discard(key);
        }
        if !doomed.is_empty() {
            if let Err(e) = self.persist_index() {
                warn!(error = %e, "failed to persist cache index after invalidate");
            }
        }
        doomed.len()
    }

    /// Remove every entry and its persisted data. When the store fails part
    /// way, entries still present in storage stay indexed and the persisted
    /// index is rewritten to match.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        if let Err(e) = self.store.clear() {
            let removed: Vec<CacheKey> = self
                .index
                .iter()
                .map(|(key, _)| key)
                .filter(|key| !self.store.exists(key))
                .cloned()
                .collect();
            for key in &removed {
                self.forget(key);
            }
            if let Err(save) = self.persist_index() {
                debug!(error = %save, "failed to rewrite cache index after partial clear");
            }
            return Err(e);
        }
        self.index.clear();
        self.total_bytes = 0;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        CacheStats {
            entries: self.index.len(),
            total_bytes: self.total_bytes,
            oldest_age_secs: self
                .index
                .iter()
                .map(|(_, m)| m.created_at)
                .min()
                .map(|created| (now - created).max(0)),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn is_expired(&self, meta: &EntryMeta, now: i64) -> bool {
        self.config.ttl_days > 0
            && now - meta.created_at > self.config.ttl_days as i64 * SECS_PER_DAY
    }

    fn miss(&mut self, key: &CacheKey, reason: &str) -> Option<Frame> {
        self.misses += 1;
        debug!(key = %key, reason, "cache miss");
        None
    }

    /// Drop an index record without touching storage.
    fn forget(&mut self, key: &CacheKey) {
        if let Some(meta) = self.index.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(meta.size_bytes);
        }
    }

    /// Drop an index record and its persisted data. Storage failures are
    /// swallowed; the index no longer references the entry either way.
    fn discard(&mut self, key: &CacheKey) {
        self.forget(key);
        if let Err(e) = self.store.remove(key) {
            debug!(key = %key, error = %e, "ignoring cache delete race");
        }
    }

    fn evict(&mut self) {
        let now = self.clock.now();
        let expired: Vec<CacheKey> = self
            .index
            .iter()
            .filter(|(_, m)| self.is_expired(m, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            debug!(key = %key, "evicting expired cache entry");
            self.discard(&key);
            self.evictions += 1;
        }

        while self.index.len() > self.config.max_entries {
            if !self.evict_lru("entry limit") {
                break;
            }
        }
        while self.total_bytes > self.config.max_size_bytes {
            if !self.evict_lru("size limit") {
                break;
            }
        }
    }

    fn evict_lru(&mut self, reason: &str) -> bool {
        let Some(key) = self.index.peek_lru().cloned() else {
            return false;
        };
        debug!(key = %key, reason, "evicting least-recently-used cache entry");
        self.discard(&key);
        self.evictions += 1;
        true
    }

    fn persist_index(&mut self) -> Result<(), CacheError> {
        let order = self.index.keys_lru_first();
        self.store.save_index(&order)
    }
}
