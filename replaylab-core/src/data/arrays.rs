//! Dense ticker × day layout for the simulation engine.
//!
//! Per-ticker indicator/signal tables are projected onto the union of their
//! dates (missing cells are NaN / false) and trimmed to the span where at
//! least one ticker has every required indicator defined. That trim is what
//! skips indicator warm-up without a hard-coded lookback.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use super::provider::DataError;
use crate::domain::{columns, Frame, Ticker};

/// Row-major `(ticker, day)` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    n_tickers: usize,
    n_days: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn filled(n_tickers: usize, n_days: usize, value: T) -> Self {
        Self {
            n_tickers,
            n_days,
            data: vec![value; n_tickers * n_days],
        }
    }

    #[inline]
    pub fn get(&self, ticker: usize, day: usize) -> T {
        self.data[ticker * self.n_days + day]
    }

    #[inline]
    pub fn set(&mut self, ticker: usize, day: usize, value: T) {
        self.data[ticker * self.n_days + day] = value;
    }

    /// All days for one ticker.
    pub fn row(&self, ticker: usize) -> &[T] {
        &self.data[ticker * self.n_days..(ticker + 1) * self.n_days]
    }

    pub fn n_tickers(&self) -> usize {
        self.n_tickers
    }

    pub fn n_days(&self) -> usize {
        self.n_days
    }

    fn trimmed(&self, first: usize, last: usize) -> Self {
        let n_days = last - first + 1;
        let mut data = Vec::with_capacity(self.n_tickers * n_days);
        for t in 0..self.n_tickers {
            data.extend_from_slice(&self.row(t)[first..=last]);
        }
        Self {
            n_tickers: self.n_tickers,
            n_days,
            data,
        }
    }
}

/// Market data and signals for every simulated ticker on the unified calendar.
#[derive(Debug, Clone)]
pub struct MarketArrays {
    pub tickers: Vec<Ticker>,
    pub dates: Vec<NaiveDate>,
    pub close: Grid<f64>,
    pub high: Grid<f64>,
    pub low: Grid<f64>,
    pub target: Grid<f64>,
    pub filter: Grid<f64>,
    pub noise: Grid<f64>,
    pub entry: Grid<bool>,
    pub exit: Grid<bool>,
    ticker_index: HashMap<Ticker, usize>,
    date_index: HashMap<NaiveDate, usize>,
}

impl MarketArrays {
    pub fn n_tickers(&self) -> usize {
        self.tickers.len()
    }

    pub fn n_days(&self) -> usize {
        self.dates.len()
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.ticker_index.get(ticker).copied()
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// A ticker has valid data on a day when its close is a positive number.
    #[inline]
    pub fn is_valid(&self, ticker: usize, day: usize) -> bool {
        let close = self.close.get(ticker, day);
        close.is_finite() && close > 0.0
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Projects per-ticker tables onto a dense calendar.
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    required: Vec<String>,
}

impl Default for ArrayBuilder {
    fn default() -> Self {
        Self {
            required: vec![columns::CLOSE.to_string()],
        }
    }
}

impl ArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add numeric columns that must be finite for a day to count as defined.
    pub fn require<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.required.contains(&name) {
                self.required.push(name);
            }
        }
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn build(&self, tables: &[(Ticker, Frame)]) -> Result<MarketArrays, DataError> {
        if tables.is_empty() {
            return Err(DataError::NoUsableTickers);
        }
        for (ticker, frame) in tables {
            require_signal_columns(ticker, frame)?;
        }

        let calendar: Vec<NaiveDate> = tables
            .iter()
            .flat_map(|(_, f)| f.dates().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let calendar_index: HashMap<NaiveDate, usize> =
            calendar.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let n_tickers = tables.len();
        let n_days = calendar.len();
        let nan_grid = || Grid::filled(n_tickers, n_days, f64::NAN);
        let mut close = nan_grid();
        let mut high = nan_grid();
        let mut low = nan_grid();
        let mut target = nan_grid();
        let mut filter = nan_grid();
        let mut noise = nan_grid();
        let mut entry = Grid::filled(n_tickers, n_days, false);
        let mut exit = Grid::filled(n_tickers, n_days, false);
        let mut defined = vec![false; n_days];

        for (t, (_, frame)) in tables.iter().enumerate() {
            let required: Vec<Option<&[f64]>> =
                self.required.iter().map(|name| frame.values(name)).collect();
            for (row, date) in frame.dates().iter().enumerate() {
                let d = calendar_index[date];
                close.set(t, d, frame.value(columns::CLOSE, row));
                high.set(t, d, frame.value(columns::HIGH, row));
                low.set(t, d, frame.value(columns::LOW, row));
                target.set(t, d, frame.value(columns::TARGET, row));
                filter.set(t, d, frame.value(columns::FILTER, row));
                noise.set(t, d, frame.value(columns::NOISE, row));
                entry.set(t, d, frame.flag(columns::ENTRY_SIGNAL, row));
                exit.set(t, d, frame.flag(columns::EXIT_SIGNAL, row));

                let complete = required
                    .iter()
                    .all(|col| col.is_some_and(|v| v[row].is_finite()));
                if complete {
                    defined[d] = true;
                }
            }
        }

        let (Some(first), Some(last)) = (
            defined.iter().position(|&x| x),
            defined.iter().rposition(|&x| x),
        ) else {
            return Err(DataError::NoUsableTickers);
        };

        let tickers: Vec<Ticker> = tables.iter().map(|(t, _)| t.clone()).collect();
        let dates = calendar[first..=last].to_vec();
        Ok(MarketArrays {
            ticker_index: tickers.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect(),
            date_index: dates.iter().enumerate().map(|(i, d)| (*d, i)).collect(),
            tickers,
            dates,
            close: close.trimmed(first, last),
            high: high.trimmed(first, last),
            low: low.trimmed(first, last),
            target: target.trimmed(first, last),
            filter: filter.trimmed(first, last),
            noise: noise.trimmed(first, last),
            entry: entry.trimmed(first, last),
            exit: exit.trimmed(first, last),
        })
    }
}

/// Check a strategy output table has the columns the builder reads.
pub fn require_signal_columns(ticker: &str, frame: &Frame) -> Result<(), DataError> {
    frame
        .require(&[columns::CLOSE, columns::ENTRY_SIGNAL, columns::EXIT_SIGNAL])
        .map_err(|source| DataError::InvalidTable {
            ticker: ticker.to_string(),
            source,
        })
}
