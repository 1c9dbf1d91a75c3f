//! Risk exits evaluated independently of strategy signals.
//!
//! Priority when several trigger on the same bar:
//! stop-loss > take-profit > trailing stop. All conditions compare the
//! bar's close; the running high is advanced (with the bar's high and close)
//! before the trailing stop is evaluated.

use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, Position};

/// Optional percentage thresholds, as fractions (0.05 = 5%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRules {
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing_stop_pct: Option<f64>,
}

impl ExitRules {
    pub fn is_empty(&self) -> bool {
        active(self.stop_loss_pct).is_none()
            && active(self.take_profit_pct).is_none()
            && active(self.trailing_stop_pct).is_none()
    }

    /// Name and value of the first threshold that is negative or not finite.
    pub fn first_invalid(&self) -> Option<(&'static str, f64)> {
        [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("trailing_stop_pct", self.trailing_stop_pct),
        ]
        .into_iter()
        .find_map(|(name, v)| v.filter(|x| !(x.is_finite() && *x >= 0.0)).map(|x| (name, x)))
    }
}

/// A threshold counts only when it is a positive number.
fn active(pct: Option<f64>) -> Option<f64> {
    pct.filter(|p| p.is_finite() && *p > 0.0)
}

#[derive(Debug, Clone, Default)]
pub struct OrderManager {
    rules: ExitRules,
}

impl OrderManager {
    pub fn new(rules: ExitRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ExitRules {
        &self.rules
    }

    /// Update the position's running high and report at most one risk exit.
    ///
    /// A bar without a valid close is skipped entirely.
    pub fn check(&self, position: &mut Position, high: f64, close: f64) -> Option<ExitReason> {
        if !(close.is_finite() && close > 0.0) {
            return None;
        }
        position.advance_high(close);
        position.advance_high(high);

        let entry = position.entry_price;
        if let Some(pct) = active(self.rules.stop_loss_pct) {
            if close <= entry * (1.0 - pct) {
                return Some(ExitReason::StopLoss);
            }
        }
        if let Some(pct) = active(self.rules.take_profit_pct) {
            if close >= entry * (1.0 + pct) {
                return Some(ExitReason::TakeProfit);
            }
        }
        if let Some(pct) = active(self.rules.trailing_stop_pct) {
            if close <= position.highest_price_since_entry * (1.0 - pct) {
                return Some(ExitReason::TrailingStop);
            }
        }
        None
    }
}
