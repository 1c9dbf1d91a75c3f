//! Volatility-driven sizing: volatility targeting and fixed-risk.

use crate::strategy::indicators::sample_std;

/// The last `lookback` entries of a dense return series.
pub fn recent(history: &[f64], lookback: usize) -> &[f64] {
    &history[history.len().saturating_sub(lookback)..]
}

/// Sample standard deviation of the finite returns in the last `lookback`
/// days. `None` when fewer than two (or fewer than half the lookback) are
/// available, or the deviation is not a positive number.
pub fn recent_volatility(history: &[f64], lookback: usize) -> Option<f64> {
    let finite: Vec<f64> = recent(history, lookback)
        .iter()
        .copied()
        .filter(|r| r.is_finite())
        .collect();
    if finite.len() < 2 || finite.len() * 2 < lookback {
        return None;
    }
    let sigma = sample_std(&finite);
    (sigma.is_finite() && sigma > 0.0).then_some(sigma)
}

/// Equal-split capital scaled down so the position's volatility does not
/// exceed `target_daily`. Never scales up.
pub fn volatility_scaled(equal_split: f64, sigma: f64, target_daily: f64) -> f64 {
    equal_split * (target_daily / sigma).min(1.0)
}

/// Capital such that a one-sigma adverse move loses `risk_fraction` of cash,
/// capped at the equal-split ceiling.
pub fn fixed_risk(cash: f64, equal_split: f64, sigma: f64, risk_fraction: f64) -> f64 {
    (risk_fraction * cash / sigma).min(equal_split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatility_needs_enough_history() {
        assert_eq!(recent_volatility(&[0.01], 20), None);
        let sparse = [f64::NAN, f64::NAN, f64::NAN, 0.01, -0.01];
        assert_eq!(recent_volatility(&sparse, 5), None);
        assert!(recent_volatility(&[0.01, -0.01, 0.02], 4).is_some());
    }

    #[test]
    fn zero_volatility_is_none() {
        assert_eq!(recent_volatility(&[0.01; 10], 10), None);
    }

    #[test]
    fn lookback_uses_tail() {
        let mut history = vec![0.5, -0.5];
        history.extend([0.01, -0.01, 0.01, -0.01]);
        let sigma = recent_volatility(&history, 4).unwrap();
        assert!(sigma < 0.02);
    }

    #[test]
    fn volatility_scaling_only_shrinks() {
        assert_eq!(volatility_scaled(1000.0, 0.02, 0.01), 500.0);
        assert_eq!(volatility_scaled(1000.0, 0.005, 0.01), 1000.0);
    }

    #[test]
    fn fixed_risk_caps_at_equal_split() {
        // 1% of 100k / 2% sigma = 50k, capped to 20k
        assert_eq!(fixed_risk(100_000.0, 20_000.0, 0.02, 0.01), 20_000.0);
        // 1% of 100k / 10% sigma = 10k
        assert!((fixed_risk(100_000.0, 20_000.0, 0.10, 0.01) - 10_000.0).abs() < 1e-9);
    }
}
