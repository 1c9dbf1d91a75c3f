//! Per-ticker table loading for the runner.
//!
//! For each ticker:
//! 1. If the store reports a watermark and the cache holds a fresh entry for
//!    (ticker, interval, strategy fingerprint) → use it
//! 2. Otherwise load the raw table, validate it, run the strategy, and store
//!    the result in the cache under the store's watermark (or the last bar
//!    date when the store cannot tell)
//! 3. Any failure skips the ticker with a warning
//!
//! Loading fails as a whole only when no ticker survives.

use std::sync::MutexGuard;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use replaylab_core::cache::{IndicatorCache, SharedCache};
use replaylab_core::data::{require_signal_columns, validate_ohlcv, DataError, OhlcvStore};
use replaylab_core::domain::{Frame, Ticker};
use replaylab_core::fingerprint::{Fingerprint, Watermark};
use replaylab_core::strategy::Strategy;

/// A ticker that was dropped during loading, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: Ticker,
    pub reason: String,
}

/// Strategy-prepared tables ready for the array builder.
#[derive(Debug, Clone, Default)]
pub struct LoadedTables {
    pub tables: Vec<(Ticker, Frame)>,
    pub skipped: Vec<SkippedTicker>,
    pub cache_hits: usize,
}

pub struct DataLoader<'a> {
    store: &'a dyn OhlcvStore,
    cache: Option<&'a SharedCache>,
    interval: &'a str,
}

fn lock(cache: &SharedCache) -> MutexGuard<'_, IndicatorCache> {
    // Poisoning is ignored: cache mutations never leave the index half-updated.
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<'a> DataLoader<'a> {
    pub fn new(store: &'a dyn OhlcvStore, interval: &'a str) -> Self {
        Self {
            store,
            cache: None,
            interval,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a SharedCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn load(
        &self,
        strategy: &dyn Strategy,
        tickers: &[Ticker],
    ) -> Result<LoadedTables, DataError> {
        let fingerprint = strategy.fingerprint();
        let mut loaded = LoadedTables::default();

        for ticker in tickers {
            match self.load_one(strategy, &fingerprint, ticker) {
                Ok((frame, hit)) => {
                    if hit {
                        loaded.cache_hits += 1;
                    }
                    loaded.tables.push((ticker.clone(), frame));
                }
                Err(reason) => {
                    warn!(ticker = %ticker, interval = self.interval, %reason, "skipping ticker");
                    loaded.skipped.push(SkippedTicker {
                        ticker: ticker.clone(),
                        reason,
                    });
                }
            }
        }

        if loaded.tables.is_empty() {
            return Err(DataError::NoUsableTickers);
        }
        debug!(
            loaded = loaded.tables.len(),
            skipped = loaded.skipped.len(),
            cache_hits = loaded.cache_hits,
            "tables loaded"
        );
        Ok(loaded)
    }

    /// Returns the prepared table and whether it came from the cache.
    fn load_one(
        &self,
        strategy: &dyn Strategy,
        fingerprint: &Fingerprint,
        ticker: &str,
    ) -> Result<(Frame, bool), String> {
        let store_watermark = self.store.watermark(ticker, self.interval);

        if let (Some(cache), Some(watermark)) = (self.cache, store_watermark) {
            if let Some(frame) = lock(cache).get(ticker, self.interval, fingerprint, watermark) {
                return Ok((frame, true));
            }
        }

        let raw = self
            .store
            .load(ticker, self.interval)
            .map_err(|e| e.to_string())?;
        validate_ohlcv(ticker, &raw).map_err(|e| e.to_string())?;

        let watermark = match (store_watermark, raw.last_date()) {
            (Some(wm), _) => wm,
            (None, Some(last)) => Watermark::from_date(last),
            (None, None) => return Err("empty table".to_string()),
        };

        if store_watermark.is_none() {
            if let Some(cache) = self.cache {
                let cached = lock(cache).get(ticker, self.interval, fingerprint, watermark);
                if let Some(frame) = cached {
                    return Ok((frame, true));
                }
            }
        }

        let prepared = strategy.prepare(&raw).map_err(|e| e.to_string())?;
        require_signal_columns(ticker, &prepared).map_err(|e| e.to_string())?;

        if let Some(cache) = self.cache {
            let stored = lock(cache).set(ticker, self.interval, fingerprint, watermark, &prepared);
            if let Err(e) = stored {
                warn!(ticker, error = %e, "failed to cache prepared table");
            }
        }
        Ok((prepared, false))
    }
}
