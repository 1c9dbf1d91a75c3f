//! Kelly fraction from the trade ledger so far.

use crate::domain::Trade;

/// `f = p − (1 − p) / b` with p the win rate and b the average-win /
/// average-loss ratio (in percent returns), clamped to `max_fraction`.
///
/// `None` when there are fewer than `min_trades` trades or the edge is not
/// positive.
pub fn kelly_fraction(trades: &[Trade], min_trades: usize, max_fraction: f64) -> Option<f64> {
    let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
    if closed.is_empty() || closed.len() < min_trades {
        return None;
    }

    let wins: Vec<f64> = closed
        .iter()
        .filter(|t| t.pnl > 0.0)
        .map(|t| t.pnl_pct)
        .collect();
    let losses: Vec<f64> = closed
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl_pct.abs())
        .collect();

    let p = wins.len() as f64 / closed.len() as f64;
    let f = if losses.is_empty() {
        p
    } else if wins.is_empty() {
        return None;
    } else {
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        if avg_loss <= 0.0 {
            p
        } else {
            let b = avg_win / avg_loss;
            p - (1.0 - p) / b
        }
    };

    (f.is_finite() && f > 0.0).then(|| f.min(max_fraction))
}
