//! Moving-average crossover.
//!
//! Enters when the fast SMA crosses above the slow SMA, exits on the cross
//! back below. Emits no target/filter/noise, so entries fill at close and
//! never whipsaw.

use super::indicators::rolling_mean;
use super::{input, positive_window, Strategy, StrategyError};
use crate::domain::{columns, Frame};
use crate::fingerprint::StrategyParams;

pub const SMA_FAST: &str = "sma_fast";
pub const SMA_SLOW: &str = "sma_slow";

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast: usize,
    slow: usize,
}

impl SmaCrossover {
    pub fn new(fast: usize, slow: usize) -> Result<Self, StrategyError> {
        positive_window("fast", fast)?;
        positive_window("slow", slow)?;
        if fast >= slow {
            return Err(StrategyError::InvalidParameter {
                name: "fast".into(),
                value: fast as f64,
                reason: format!("must be shorter than slow ({slow})"),
            });
        }
        Ok(Self { fast, slow })
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn params(&self) -> StrategyParams {
        StrategyParams::new(self.name())
            .with("fast", self.fast as f64)
            .with("slow", self.slow as f64)
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![SMA_FAST.to_string(), SMA_SLOW.to_string()]
    }

    fn calculate_indicators(&self, table: &Frame) -> Result<Frame, StrategyError> {
        let close = input(self.name(), table, columns::CLOSE)?;
        let fast = rolling_mean(close, self.fast);
        let slow = rolling_mean(close, self.slow);
        Ok(table
            .clone()
            .with_values(SMA_FAST, fast)?
            .with_values(SMA_SLOW, slow)?)
    }

    fn generate_signals(&self, table: &Frame) -> Result<Frame, StrategyError> {
        let fast = input(self.name(), table, SMA_FAST)?;
        let slow = input(self.name(), table, SMA_SLOW)?;
        let n = table.len();
        let mut entry = vec![false; n];
        let mut exit = vec![false; n];
        for i in 1..n {
            // NaN comparisons are false, so warm-up rows never signal.
            entry[i] = fast[i] > slow[i] && fast[i - 1] <= slow[i - 1];
            exit[i] = fast[i] < slow[i] && fast[i - 1] >= slow[i - 1];
        }
        Ok(table
            .clone()
            .with_flags(columns::ENTRY_SIGNAL, entry)?
            .with_flags(columns::EXIT_SIGNAL, exit)?)
    }
}
