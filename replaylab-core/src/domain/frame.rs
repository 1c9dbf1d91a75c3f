//! Frame: a time-indexed table of named numeric and boolean columns.
//!
//! Used for both the raw OHLCV table a store hands us and the indicator/signal
//! table a strategy produces. Dates are strictly ascending. Missing numeric
//! values are NaN; flags have no missing state.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use super::bar::Bar;

/// Well-known column names shared by stores, strategies and the engine.
pub mod columns {
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const VOLUME: &str = "volume";

    /// Flag: open a position at this bar.
    pub const ENTRY_SIGNAL: &str = "entry_signal";
    /// Flag: close an open position at this bar.
    pub const EXIT_SIGNAL: &str = "exit_signal";
    /// Entry reference price (breakout level). Falls back to close when absent.
    pub const TARGET: &str = "target";
    /// Whipsaw threshold: a close below it on the entry bar invalidates the entry.
    pub const FILTER: &str = "filter";
    /// Same-day tie-break metric, lower ranks first.
    pub const NOISE: &str = "noise";

    pub const OHLCV: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("column '{column}' has {actual} rows, frame has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("dates must be strictly ascending (violated at row {index})")]
    UnsortedDates { index: usize },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("frame has no rows")]
    Empty,
}

/// Time-indexed table with named `f64` and `bool` columns.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    dates: Vec<NaiveDate>,
    values: BTreeMap<String, Vec<f64>>,
    flags: BTreeMap<String, Vec<bool>>,
}

impl Frame {
    /// Create an empty-column frame over `dates`, which must be strictly ascending.
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, FrameError> {
        if let Some(index) = dates.windows(2).position(|w| w[0] >= w[1]) {
            return Err(FrameError::UnsortedDates { index: index + 1 });
        }
        Ok(Self {
            dates,
            values: BTreeMap::new(),
            flags: BTreeMap::new(),
        })
    }

    /// Build an OHLCV frame from bars.
    pub fn from_bars(bars: &[Bar]) -> Result<Self, FrameError> {
        let mut frame = Self::new(bars.iter().map(|b| b.date).collect())?;
        frame.insert_values(columns::OPEN, bars.iter().map(|b| b.open).collect())?;
        frame.insert_values(columns::HIGH, bars.iter().map(|b| b.high).collect())?;
        frame.insert_values(columns::LOW, bars.iter().map(|b| b.low).collect())?;
        frame.insert_values(columns::CLOSE, bars.iter().map(|b| b.close).collect())?;
        frame.insert_values(columns::VOLUME, bars.iter().map(|b| b.volume).collect())?;
        Ok(frame)
    }

    /// Convert back to bars. Requires open/high/low/close; volume defaults to 0.
    pub fn to_bars(&self) -> Result<Vec<Bar>, FrameError> {
        self.require(&[columns::OPEN, columns::HIGH, columns::LOW, columns::CLOSE])?;
        Ok((0..self.len())
            .map(|i| Bar {
                date: self.dates[i],
                open: self.value(columns::OPEN, i),
                high: self.value(columns::HIGH, i),
                low: self.value(columns::LOW, i),
                close: self.value(columns::CLOSE, i),
                volume: self
                    .values(columns::VOLUME)
                    .map(|v| v[i])
                    .unwrap_or(0.0),
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Insert or replace a numeric column.
    pub fn insert_values(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), FrameError> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        self.flags.remove(&name);
        self.values.insert(name, values);
        Ok(())
    }

    /// Insert or replace a boolean column.
    pub fn insert_flags(
        &mut self,
        name: impl Into<String>,
        flags: Vec<bool>,
    ) -> Result<(), FrameError> {
        let name = name.into();
        self.check_len(&name, flags.len())?;
        self.values.remove(&name);
        self.flags.insert(name, flags);
        Ok(())
    }

    /// Builder form of [`Frame::insert_values`].
    pub fn with_values(mut self, name: &str, values: Vec<f64>) -> Result<Self, FrameError> {
        self.insert_values(name, values)?;
        Ok(self)
    }

    /// Builder form of [`Frame::insert_flags`].
    pub fn with_flags(mut self, name: &str, flags: Vec<bool>) -> Result<Self, FrameError> {
        self.insert_flags(name, flags)?;
        Ok(self)
    }

    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    pub fn flags(&self, name: &str) -> Option<&[bool]> {
        self.flags.get(name).map(|v| v.as_slice())
    }

    /// Numeric value at row `i`; NaN when the column is absent.
    pub fn value(&self, name: &str, i: usize) -> f64 {
        self.values
            .get(name)
            .and_then(|v| v.get(i).copied())
            .unwrap_or(f64::NAN)
    }

    /// Flag at row `i`; false when the column is absent.
    pub fn flag(&self, name: &str, i: usize) -> bool {
        self.flags
            .get(name)
            .and_then(|v| v.get(i).copied())
            .unwrap_or(false)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.flags.contains_key(name)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn flag_columns(&self) -> impl Iterator<Item = (&str, &[bool])> {
        self.flags.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn column_count(&self) -> usize {
        self.values.len() + self.flags.len()
    }

    /// Fail with the first missing column among `names`.
    pub fn require(&self, names: &[&str]) -> Result<(), FrameError> {
        match names.iter().find(|n| !self.has_column(n)) {
            Some(missing) => Err(FrameError::MissingColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Raw-table contract: non-empty with every OHLCV column.
    pub fn validate_ohlcv(&self) -> Result<(), FrameError> {
        if self.is_empty() {
            return Err(FrameError::Empty);
        }
        self.require(&columns::OHLCV)
    }

    /// Rough in-memory footprint, used by stores that cannot stat a file.
    pub fn estimated_size_bytes(&self) -> u64 {
        let rows = self.len() as u64;
        rows * 4 + rows * 8 * self.values.len() as u64 + rows * self.flags.len() as u64
    }

    fn check_len(&self, name: &str, actual: usize) -> Result<(), FrameError> {
        if actual != self.dates.len() {
            return Err(FrameError::LengthMismatch {
                column: name.to_string(),
                expected: self.dates.len(),
                actual,
            });
        }
        Ok(())
    }
}

/// NaN-aware equality: two NaNs in the same cell compare equal.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        if self.dates != other.dates || self.flags != other.flags {
            return false;
        }
        if self.values.len() != other.values.len() {
            return false;
        }
        self.values.iter().all(|(name, a)| match other.values.get(name) {
            Some(b) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| x == y || (x.is_nan() && y.is_nan())),
            None => false,
        })
    }
}
