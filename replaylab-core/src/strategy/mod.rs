//! Strategy collaborator contract.
//!
//! A strategy turns a raw OHLCV table into an indicator/signal table. The
//! engine only reads these columns from it:
//! - `entry_signal`, `exit_signal` (flags, required)
//! - `target`: entry reference price (optional, close is used when absent)
//! - `filter`: whipsaw threshold (optional, no whipsaw check when absent)
//! - `noise`: same-day tie-break, lower ranks first (optional, ranks last when absent)
//!
//! Strategies never see portfolio state.

pub mod indicators;
pub mod sma_crossover;
pub mod volatility_breakout;

use thiserror::Error;

use crate::domain::{Frame, FrameError};
use crate::fingerprint::{Fingerprint, StrategyParams};

pub use sma_crossover::SmaCrossover;
pub use volatility_breakout::VolatilityBreakout;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy '{strategy}' needs input column '{column}'")]
    MissingInput { strategy: String, column: String },

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: String,
        value: f64,
        reason: String,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub trait Strategy: Send + Sync {
    /// Stable name, part of the fingerprint (e.g. "volatility_breakout").
    fn name(&self) -> &str;

    /// Tunable parameters.
    fn params(&self) -> StrategyParams;

    fn fingerprint(&self) -> Fingerprint {
        self.params().fingerprint()
    }

    /// Numeric columns that must all be defined for a bar to be simulated.
    fn required_indicators(&self) -> Vec<String> {
        Vec::new()
    }

    /// Add indicator columns to a raw OHLCV table.
    fn calculate_indicators(&self, table: &Frame) -> Result<Frame, StrategyError>;

    /// Add `entry_signal`/`exit_signal` (and optionally target/filter/noise).
    fn generate_signals(&self, table: &Frame) -> Result<Frame, StrategyError>;

    /// Indicators then signals.
    fn prepare(&self, raw: &Frame) -> Result<Frame, StrategyError> {
        let with_indicators = self.calculate_indicators(raw)?;
        self.generate_signals(&with_indicators)
    }
}

/// Borrow a numeric input column or fail with the strategy's name.
pub(crate) fn input<'a>(
    strategy: &str,
    table: &'a Frame,
    column: &str,
) -> Result<&'a [f64], StrategyError> {
    table.values(column).ok_or_else(|| StrategyError::MissingInput {
        strategy: strategy.to_string(),
        column: column.to_string(),
    })
}

pub(crate) fn positive_window(name: &str, value: usize) -> Result<(), StrategyError> {
    if value == 0 {
        return Err(StrategyError::InvalidParameter {
            name: name.to_string(),
            value: 0.0,
            reason: "window must be at least 1".into(),
        });
    }
    Ok(())
}
