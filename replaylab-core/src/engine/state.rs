//! Engine configuration, mutable simulation state, and run result types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Position, Ticker, Trade};
use crate::orders::ExitRules;
use crate::sizing::{SizingMethod, SizingParams};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("max_slots must be at least 1")]
    ZeroSlots,

    #[error("{name} must be a non-negative number below 1, got {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("{name} must be a non-negative number, got {value}")]
    InvalidExitRule { name: &'static str, value: f64 },

    #[error("market has no tickers or no days to simulate")]
    EmptyMarket,
}

/// Which simulation loop runs. Both produce identical results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Precomputes returns, valuation prices and per-day candidate lists for
    /// the whole grid, then walks days applying only the stateful steps.
    #[default]
    Vectorized,
    /// Derives everything day by day from the raw grids.
    EventLoop,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "vectorized" => Ok(Variant::Vectorized),
            "event_loop" | "event" => Ok(Variant::EventLoop),
            other => Err(format!("unknown engine variant '{other}'")),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Vectorized => f.write_str("vectorized"),
            Variant::EventLoop => f.write_str("event_loop"),
        }
    }
}

/// Configuration for a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Commission per leg, as a fraction of notional.
    pub fee_rate: f64,
    /// Adverse price adjustment per leg, as a fraction of price.
    pub slippage_rate: f64,
    pub max_slots: usize,
    pub sizing_method: SizingMethod,
    pub sizing: SizingParams,
    pub exits: ExitRules,
    pub variant: Variant,
}

impl EngineConfig {
    pub fn new(initial_capital: f64, max_slots: usize) -> Self {
        Self {
            initial_capital,
            fee_rate: 0.0,
            slippage_rate: 0.0,
            max_slots,
            sizing_method: SizingMethod::Equal,
            sizing: SizingParams::default(),
            exits: ExitRules::default(),
            variant: Variant::default(),
        }
    }

    pub fn with_costs(mut self, fee_rate: f64, slippage_rate: f64) -> Self {
        self.fee_rate = fee_rate;
        self.slippage_rate = slippage_rate;
        self
    }

    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }

    pub fn with_sizing(mut self, method: SizingMethod, params: SizingParams) -> Self {
        self.sizing_method = method;
        self.sizing = params;
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Reject structurally invalid configuration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(EngineError::NonPositiveCapital(self.initial_capital));
        }
        if self.max_slots == 0 {
            return Err(EngineError::ZeroSlots);
        }
        for (name, value) in [
            ("fee_rate", self.fee_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !(value.is_finite() && (0.0..1.0).contains(&value)) {
                return Err(EngineError::InvalidRate { name, value });
            }
        }
        if let Some((name, value)) = self.exits.first_invalid() {
            return Err(EngineError::InvalidExitRule { name, value });
        }
        Ok(())
    }
}

/// End-of-day account state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions_value: f64,
    pub equity: f64,
    pub open_positions: usize,
}

/// Mutable state for one run. Never shared across runs.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub cash: f64,
    /// One optional position per ticker.
    pub positions: Vec<Option<Position>>,
    pub open_count: usize,
    /// Most recent valid close per ticker, NaN before the first one.
    pub last_valid_close: Vec<f64>,
    /// Dense daily returns per ticker (NaN where no return is defined).
    pub returns: Vec<Vec<f64>>,
    pub trades: Vec<Trade>,
    pub snapshots: Vec<DailySnapshot>,
    /// Σ over days of position value / equity, per ticker.
    pub exposure_sum: Vec<f64>,
    pub max_open_positions: usize,
}

impl SimulationState {
    pub fn new(initial_capital: f64, n_tickers: usize, n_days: usize) -> Self {
        Self {
            cash: initial_capital,
            positions: vec![None; n_tickers],
            open_count: 0,
            last_valid_close: vec![f64::NAN; n_tickers],
            returns: vec![vec![f64::NAN; n_days]; n_tickers],
            trades: Vec::new(),
            snapshots: Vec::with_capacity(n_days),
            exposure_sum: vec![0.0; n_tickers],
            max_open_positions: 0,
        }
    }

    pub fn is_open(&self, ticker: usize) -> bool {
        self.positions[ticker].is_some()
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub tickers: Vec<Ticker>,
    pub initial_capital: f64,
    pub snapshots: Vec<DailySnapshot>,
    pub trades: Vec<Trade>,
    /// Dense daily returns per ticker over the simulated range.
    pub daily_returns: Vec<Vec<f64>>,
    /// Mean daily share of equity held in each ticker.
    pub average_exposure: Vec<f64>,
    pub max_open_positions: usize,
}

impl RunResult {
    pub(crate) fn from_state(
        tickers: Vec<Ticker>,
        initial_capital: f64,
        state: SimulationState,
    ) -> Self {
        let days = state.snapshots.len().max(1) as f64;
        Self {
            tickers,
            initial_capital,
            average_exposure: state.exposure_sum.iter().map(|s| s / days).collect(),
            snapshots: state.snapshots,
            trades: state.trades,
            daily_returns: state.returns,
            max_open_positions: state.max_open_positions,
        }
    }

    pub fn final_equity(&self) -> f64 {
        self.snapshots
            .last()
            .map(|s| s.equity)
            .unwrap_or(self.initial_capital)
    }

    pub fn equity_curve(&self) -> Vec<(NaiveDate, f64)> {
        self.snapshots.iter().map(|s| (s.date, s.equity)).collect()
    }

    pub fn total_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.snapshots.first().map(|s| s.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.snapshots.last().map(|s| s.date)
    }
}
