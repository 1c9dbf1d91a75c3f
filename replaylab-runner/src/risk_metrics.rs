//! Multi-asset risk metrics: historical VaR/CVaR, volatility, correlation,
//! and concentration of holdings.
//!
//! Inputs are the portfolio's period returns, each asset's dense return
//! series (NaN where undefined) and each asset's average share of equity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{mean_f64, std_dev};

/// Below this many portfolio returns no risk metrics are reported.
pub const MIN_OBSERVATIONS: usize = 20;

/// Below this many overlapping observations a pair's correlation is 0.0.
const MIN_PAIR_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// 95% historical value at risk of one period, as a negative return.
    pub var_95: f64,
    /// Mean return of the worst 5% of periods.
    pub cvar_95: f64,
    /// Annualised portfolio volatility.
    pub portfolio_volatility: f64,
    /// Annualised volatility per asset.
    pub asset_volatility: BTreeMap<String, f64>,
    /// Pairwise correlation, rows and columns in `tickers` order.
    pub tickers: Vec<String>,
    pub correlation: Vec<Vec<f64>>,
    pub avg_pairwise_correlation: f64,
    /// Herfindahl index of average exposure weights (1.0 = one asset).
    pub herfindahl: f64,
    pub max_weight: f64,
    pub sample_size: usize,
}

impl RiskMetrics {
    pub fn compute(
        tickers: &[String],
        asset_returns: &[Vec<f64>],
        portfolio_returns: &[f64],
        average_exposure: &[f64],
        periods_per_year: f64,
    ) -> Option<Self> {
        let portfolio: Vec<f64> = portfolio_returns
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .collect();
        if portfolio.len() < MIN_OBSERVATIONS {
            return None;
        }
        let (var_95, cvar_95) = historical_var_cvar(&portfolio, 0.95);
        let annualise = periods_per_year.sqrt();

        let asset_volatility = tickers
            .iter()
            .zip(asset_returns)
            .map(|(t, r)| {
                let finite: Vec<f64> = r.iter().copied().filter(|x| x.is_finite()).collect();
                (t.clone(), std_dev(&finite) * annualise)
            })
            .collect();

        let correlation = correlation_matrix(asset_returns);
        let (herfindahl, max_weight) = concentration(average_exposure);

        Some(Self {
            var_95,
            cvar_95,
            portfolio_volatility: std_dev(&portfolio) * annualise,
            asset_volatility,
            tickers: tickers.to_vec(),
            avg_pairwise_correlation: average_off_diagonal(&correlation),
            correlation,
            herfindahl,
            max_weight,
            sample_size: portfolio.len(),
        })
    }
}

/// Historical VaR and CVaR at `confidence`: the cutoff return of the worst
/// `1 - confidence` tail, and the mean of that tail.
pub fn historical_var_cvar(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let cutoff = ((sorted.len() as f64 * (1.0 - confidence)).ceil() as usize).max(1);
    let tail = &sorted[..cutoff];
    (tail[cutoff - 1], mean_f64(tail))
}

/// Pearson correlation over the days where both series are finite.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if pairs.len() < MIN_PAIR_OBSERVATIONS {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-15 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

pub fn correlation_matrix(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = series.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let c = correlation(&series[i], &series[j]);
            matrix[i][j] = c;
            matrix[j][i] = c;
        }
    }
    matrix
}

fn average_off_diagonal(matrix: &[Vec<f64>]) -> f64 {
    let n = matrix.len();
    let pairs: Vec<f64> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .map(|(i, j)| matrix[i][j])
        .collect();
    mean_f64(&pairs)
}

/// Herfindahl index and largest weight of the normalised exposures.
pub fn concentration(exposure: &[f64]) -> (f64, f64) {
    let total: f64 = exposure.iter().filter(|e| e.is_finite() && **e > 0.0).sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let weights = exposure
        .iter()
        .map(|e| if e.is_finite() && *e > 0.0 { e / total } else { 0.0 });
    weights.fold((0.0, 0.0_f64), |(hhi, max), w| (hhi + w * w, max.max(w)))
}
