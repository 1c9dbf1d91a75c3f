//! Trade: a completed round trip recorded in the ledger.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    TrailingStop,
    Whipsaw,
    /// Still open at the end of the simulated range.
    Open,
}

impl ExitReason {
    pub const ALL: [ExitReason; 6] = [
        ExitReason::Signal,
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::TrailingStop,
        ExitReason::Whipsaw,
        ExitReason::Open,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Whipsaw => "whipsaw",
            ExitReason::Open => "open",
        }
    }

    /// Risk exits are forced by the order manager rather than the strategy.
    pub fn is_risk_exit(&self) -> bool {
        matches!(
            self,
            ExitReason::StopLoss | ExitReason::TakeProfit | ExitReason::TrailingStop
        )
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed round trip. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,

    // ── Entry ──
    pub entry_date: NaiveDate,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_date: NaiveDate,
    pub exit_price: f64,

    /// Units traded.
    pub amount: f64,

    // ── PnL ──
    pub pnl: f64,
    /// Percent of total entry cost (e.g. 9.8 for +9.8%).
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,

    // ── Costs, both legs ──
    pub commission_cost: f64,
    pub slippage_cost: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Calendar days between entry and exit.
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    /// Whether the trade closed a real position (as opposed to the end-of-range mark).
    pub fn is_closed(&self) -> bool {
        self.exit_reason != ExitReason::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(pnl: f64) -> Trade {
        Trade {
            ticker: "AAA".into(),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            entry_price: 100.0,
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
            exit_price: 110.0,
            amount: 50.0,
            pnl,
            pnl_pct: pnl / 50.0,
            exit_reason: ExitReason::Signal,
            commission_cost: 5.0,
            slippage_cost: 2.5,
        }
    }

    #[test]
    fn winner_and_holding_days() {
        let trade = sample_trade(485.0);
        assert!(trade.is_winner());
        assert_eq!(trade.holding_days(), 6);
        assert!(!sample_trade(-1.0).is_winner());
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ExitReason::TrailingStop).unwrap();
        assert_eq!(json, "\"trailing_stop\"");
        assert_eq!(ExitReason::TrailingStop.to_string(), "trailing_stop");
    }

    #[test]
    fn risk_exits_are_classified() {
        assert!(ExitReason::StopLoss.is_risk_exit());
        assert!(!ExitReason::Signal.is_risk_exit());
        assert!(!ExitReason::Whipsaw.is_risk_exit());
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_trade(485.0);
        let json = serde_json::to_string(&trade).unwrap();
        let deser: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deser);
    }
}
