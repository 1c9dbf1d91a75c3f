//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity series and/or trade list in, scalar
//! out. Degenerate inputs (flat equity, no trades, no losses) resolve to 0.0 or
//! a documented cap, never NaN.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use replaylab_core::domain::{ExitReason, Trade};

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub exit_reasons: BTreeMap<String, usize>,
    pub avg_holding_days: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics. `equity_curve` is end-of-day equity per simulated
    /// day; the series used for returns starts from `initial_capital`.
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[(NaiveDate, f64)],
        trades: &[Trade],
        periods_per_year: f64,
    ) -> Self {
        let equity: Vec<f64> = std::iter::once(initial_capital)
            .chain(equity_curve.iter().map(|(_, e)| *e))
            .collect();
        let span_days = match (equity_curve.first(), equity_curve.last()) {
            (Some((first, _)), Some((last, _))) => (*last - *first).num_days(),
            _ => 0,
        };
        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();

        Self {
            total_return: total_return(&equity),
            cagr: cagr(&equity, span_days),
            max_drawdown: max_drawdown(&equity),
            calmar: calmar_ratio(&equity, span_days),
            sharpe: sharpe_ratio(&equity, periods_per_year),
            sortino: sortino_ratio(&equity, periods_per_year),
            volatility: volatility(&equity, periods_per_year),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            avg_trade_pct: mean_f64(&trades.iter().map(|t| t.pnl_pct).collect::<Vec<_>>()),
            total_trades: trades.len(),
            winning_trades,
            losing_trades: trades.len() - winning_trades,
            exit_reasons: exit_reason_counts(trades),
            avg_holding_days: mean_f64(
                &trades
                    .iter()
                    .map(|t| t.holding_days() as f64)
                    .collect::<Vec<_>>(),
            ),
            total_commission: trades.iter().map(|t| t.commission_cost).sum(),
            total_slippage: trades.iter().map(|t| t.slippage_cost).sum(),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&initial), Some(&last)) if equity.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate over a calendar span (365.25 days per year).
///
/// Returns 0.0 for a zero-length span or a non-positive endpoint.
pub fn cagr(equity: &[f64], span_days: i64) -> f64 {
    let (Some(&initial), Some(&last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    if span_days <= 0 || initial <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let years = span_days as f64 / 365.25;
    (last / initial).powf(1.0 / years) - 1.0
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Calmar ratio: CAGR / |max_drawdown|. 0.0 without a drawdown or growth.
pub fn calmar_ratio(equity: &[f64], span_days: i64) -> f64 {
    let c = cagr(equity, span_days);
    let dd = max_drawdown(equity);
    if dd >= 0.0 || c <= 0.0 {
        return 0.0;
    }
    c / dd.abs()
}

/// Annualised Sharpe ratio (zero risk-free rate).
pub fn sharpe_ratio(equity: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * periods_per_year.sqrt()
}

/// Annualised Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std * periods_per_year.sqrt()
}

/// Annualised standard deviation of period returns.
pub fn volatility(equity: &[f64], periods_per_year: f64) -> f64 {
    std_dev(&period_returns(equity)) * periods_per_year.sqrt()
}

/// Fraction of trades with positive pnl.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Count per exit reason; every reason is present, zero when unused.
pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = ExitReason::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), 0))
        .collect();
    for trade in trades {
        *counts.entry(trade.exit_reason.as_str().to_string()).or_default() += 1;
    }
    counts
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity values.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0.0 below two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn make_trade(pnl: f64, reason: ExitReason) -> Trade {
        Trade {
            ticker: "AAA".into(),
            entry_date: d(2),
            entry_price: 100.0,
            exit_date: d(5),
            exit_price: 100.0 + pnl / 10.0,
            amount: 10.0,
            pnl,
            pnl_pct: pnl / 10.0,
            exit_reason: reason,
            commission_cost: 1.0,
            slippage_cost: 0.5,
        }
    }

    #[test]
    fn total_return_and_drawdown() {
        let equity = [100.0, 120.0, 90.0, 110.0];
        assert!((total_return(&equity) - 0.10).abs() < 1e-12);
        assert!((max_drawdown(&equity) - (-0.25)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[100.0, 101.0, 102.0]), 0.0);
    }

    #[test]
    fn cagr_uses_calendar_days() {
        let equity = [100.0, 121.0];
        let two_years = (365.25 * 2.0) as i64;
        assert!((cagr(&equity, two_years) - 0.1).abs() < 1e-3);
        assert_eq!(cagr(&equity, 0), 0.0);
        assert_eq!(cagr(&[100.0, 0.0], 365), 0.0);
    }

    #[test]
    fn flat_equity_has_zero_ratios() {
        let equity = [100.0; 10];
        assert_eq!(sharpe_ratio(&equity, 252.0), 0.0);
        assert_eq!(sortino_ratio(&equity, 252.0), 0.0);
        assert_eq!(volatility(&equity, 252.0), 0.0);
        assert_eq!(calmar_ratio(&equity, 30), 0.0);
    }

    #[test]
    fn sharpe_sign_follows_drift() {
        let up: Vec<f64> = (0..50)
            .map(|i| 100.0 * (1.0 + 0.001 * i as f64 + 0.002 * (i % 2) as f64))
            .collect();
        assert!(sharpe_ratio(&up, 252.0) > 0.0);
        let down: Vec<f64> = up.iter().rev().copied().collect();
        assert!(sharpe_ratio(&down, 252.0) < 0.0);
    }

    #[test]
    fn profit_factor_caps_and_zero() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[make_trade(50.0, ExitReason::Signal)]), 100.0);
        let trades = [
            make_trade(30.0, ExitReason::Signal),
            make_trade(-10.0, ExitReason::StopLoss),
        ];
        assert!((profit_factor(&trades) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn compute_aggregates_trades() {
        let trades = vec![
            make_trade(10.0, ExitReason::Signal),
            make_trade(20.0, ExitReason::TakeProfit),
            make_trade(-5.0, ExitReason::StopLoss),
            make_trade(-5.0, ExitReason::Whipsaw),
            make_trade(8.0, ExitReason::Open),
        ];
        let curve = vec![(d(2), 1_000.0), (d(3), 1_010.0), (d(4), 1_028.0)];
        let m = PerformanceMetrics::compute(1_000.0, &curve, &trades, 252.0);

        assert_eq!(m.total_trades, 5);
        assert_eq!(m.winning_trades, 3);
        assert_eq!(m.losing_trades, 2);
        assert!((m.win_rate - 0.6).abs() < 1e-12);
        assert_eq!(m.max_consecutive_wins, 2);
        assert_eq!(m.max_consecutive_losses, 2);
        assert_eq!(m.exit_reasons["stop_loss"], 1);
        assert_eq!(m.exit_reasons["trailing_stop"], 0);
        assert_eq!(m.exit_reasons.len(), ExitReason::ALL.len());
        assert!((m.avg_holding_days - 3.0).abs() < 1e-12);
        assert!((m.total_commission - 5.0).abs() < 1e-12);
        assert!((m.total_return - 0.028).abs() < 1e-12);
        assert!((m.avg_trade_pct - 2.8).abs() < 1e-12);
    }

    #[test]
    fn empty_run_is_all_zero() {
        let m = PerformanceMetrics::compute(1_000.0, &[], &[], 252.0);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.cagr, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.total_trades, 0);
    }
}
