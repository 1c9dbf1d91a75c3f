//! OHLCV store trait and structured data errors.
//!
//! The `OhlcvStore` trait abstracts over where raw tables come from (CSV
//! files, an in-memory fixture, a synthetic generator) so the loader and the
//! tests can swap sources freely.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{Bar, Frame, FrameError};
use crate::fingerprint::Watermark;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("ticker not found: {ticker} ({interval})")]
    TickerNotFound { ticker: String, interval: String },

    #[error("invalid table for {ticker}: {source}")]
    InvalidTable {
        ticker: String,
        #[source]
        source: FrameError,
    },

    #[error("corrupt table for {ticker}: {reason}")]
    Corrupt { ticker: String, reason: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable tickers: every ticker was skipped or no date has complete indicators")]
    NoUsableTickers,
}

/// Source of raw per-ticker OHLCV tables.
pub trait OhlcvStore: Send + Sync {
    fn load(&self, ticker: &str, interval: &str) -> Result<Frame, DataError>;

    /// Freshness of the source table, if the store can tell.
    fn watermark(&self, _ticker: &str, _interval: &str) -> Option<Watermark> {
        None
    }
}

/// Raw-table contract: non-empty, strictly ascending dates, lower-case OHLCV columns.
///
/// Date ordering is already guaranteed by `Frame` construction.
pub fn validate_ohlcv(ticker: &str, frame: &Frame) -> Result<(), DataError> {
    frame
        .validate_ohlcv()
        .map_err(|source| DataError::InvalidTable {
            ticker: ticker.to_string(),
            source,
        })
}

/// In-memory store keyed by (ticker, interval).
#[derive(Debug, Default, Clone)]
pub struct MemoryOhlcvStore {
    tables: HashMap<(String, String), (Frame, Option<Watermark>)>,
}

impl MemoryOhlcvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: &str, interval: &str, frame: Frame) {
        self.tables
            .insert((ticker.to_string(), interval.to_string()), (frame, None));
    }

    pub fn insert_with_watermark(
        &mut self,
        ticker: &str,
        interval: &str,
        frame: Frame,
        watermark: Watermark,
    ) {
        self.tables.insert(
            (ticker.to_string(), interval.to_string()),
            (frame, Some(watermark)),
        );
    }

    pub fn insert_bars(
        &mut self,
        ticker: &str,
        interval: &str,
        bars: &[Bar],
    ) -> Result<(), DataError> {
        let frame = Frame::from_bars(bars).map_err(|source| DataError::InvalidTable {
            ticker: ticker.to_string(),
            source,
        })?;
        self.insert(ticker, interval, frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl OhlcvStore for MemoryOhlcvStore {
    fn load(&self, ticker: &str, interval: &str) -> Result<Frame, DataError> {
        self.tables
            .get(&(ticker.to_string(), interval.to_string()))
            .map(|(frame, _)| frame.clone())
            .ok_or_else(|| DataError::TickerNotFound {
                ticker: ticker.to_string(),
                interval: interval.to_string(),
            })
    }

    fn watermark(&self, ticker: &str, interval: &str) -> Option<Watermark> {
        self.tables
            .get(&(ticker.to_string(), interval.to_string()))
            .and_then(|(_, wm)| *wm)
    }
}
