//! Position: an open long holding that occupies one slot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An open position. Owned by exactly one slot from entry to exit.
///
/// The only mutation after entry is the trailing-stop watermark, which can
/// only rise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub ticker_index: usize,
    /// Fill price including slippage.
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_day: usize,
    /// Units held.
    pub amount: f64,
    /// Total cash spent on entry (notional plus buy commission).
    pub cost_basis: f64,
    pub entry_commission: f64,
    pub entry_slippage: f64,
    pub highest_price_since_entry: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.amount * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.market_value(price) - self.cost_basis
    }

    /// Advance the running high. Non-finite or lower prices are ignored.
    pub fn advance_high(&mut self, price: f64) {
        if price.is_finite() && price > self.highest_price_since_entry {
            self.highest_price_since_entry = price;
        }
    }
}
