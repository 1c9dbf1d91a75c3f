//! Batch weight allocation across same-day entry candidates.
//!
//! Every allocator returns fully-invested, non-negative weights (summing to
//! one) or `None`, in which case the caller degrades to a simpler method.

use super::volatility::{recent, recent_volatility};

/// Minimum complete observation rows for a covariance estimate.
const MIN_ROWS: usize = 3;
const PIVOT_EPS: f64 = 1e-14;

/// w_i ∝ 1/σ_i. `None` if any candidate lacks a usable volatility.
pub fn inverse_volatility(histories: &[&[f64]], lookback: usize) -> Option<Vec<f64>> {
    if histories.is_empty() {
        return None;
    }
    let inv: Vec<f64> = histories
        .iter()
        .map(|h| recent_volatility(h, lookback).map(|s| 1.0 / s))
        .collect::<Option<_>>()?;
    normalize(inv)
}

/// Mean-variance (maximum Sharpe) weights: w ∝ Σ⁻¹μ, negatives clipped to
/// zero and the rest renormalised. `None` on a singular covariance, too few
/// complete observations, or no positive expected return.
pub fn mean_variance(histories: &[&[f64]], lookback: usize) -> Option<Vec<f64>> {
    if histories.len() < 2 {
        return None;
    }
    let rows = complete_rows(histories, lookback)?;
    let mean = column_means(&rows);
    let cov = covariance(&rows, &mean);
    let raw = solve(cov, mean)?;
    normalize(raw.into_iter().map(|w| w.max(0.0)).collect())
}

/// Equal risk contribution weights by damped multiplicative updates,
/// starting from inverse volatility. `None` if the iteration does not reach
/// `tolerance` within `max_iterations`.
pub fn risk_parity(
    histories: &[&[f64]],
    lookback: usize,
    max_iterations: usize,
    tolerance: f64,
) -> Option<Vec<f64>> {
    let n = histories.len();
    if n < 2 {
        return None;
    }
    let rows = complete_rows(histories, lookback)?;
    let mean = column_means(&rows);
    let cov = covariance(&rows, &mean);

    let mut w: Vec<f64> = (0..n)
        .map(|i| {
            let var = cov[i][i];
            if var > 0.0 {
                1.0 / var.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect();
    if w.iter().any(|x| !x.is_finite()) {
        return None;
    }
    w = normalize(w)?;

    let budget = 1.0 / n as f64;
    for _ in 0..max_iterations {
        let sigma_w = mat_vec(&cov, &w);
        let total: f64 = w.iter().zip(&sigma_w).map(|(a, b)| a * b).sum();
        if !(total > 0.0) || sigma_w.iter().any(|x| !(*x > 0.0)) {
            return None;
        }
        let contrib: Vec<f64> = w
            .iter()
            .zip(&sigma_w)
            .map(|(a, b)| a * b / total)
            .collect();
        let worst = contrib
            .iter()
            .map(|c| (c - budget).abs())
            .fold(0.0_f64, f64::max);
        if worst < tolerance {
            return Some(w);
        }
        let next: Vec<f64> = w
            .iter()
            .zip(&contrib)
            .map(|(wi, ci)| wi * (budget / ci).sqrt())
            .collect();
        w = normalize(next)?;
    }
    None
}

/// Scale to sum one. `None` when the sum is not a positive number.
fn normalize(weights: Vec<f64>) -> Option<Vec<f64>> {
    let sum: f64 = weights.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return None;
    }
    Some(weights.into_iter().map(|w| w / sum).collect())
}

/// Days within the lookback where every candidate has a finite return.
fn complete_rows(histories: &[&[f64]], lookback: usize) -> Option<Vec<Vec<f64>>> {
    let tails: Vec<&[f64]> = histories.iter().map(|h| recent(h, lookback)).collect();
    let len = tails.iter().map(|t| t.len()).min()?;
    let rows: Vec<Vec<f64>> = (0..len)
        .map(|d| {
            tails
                .iter()
                .map(|t| t[t.len() - len + d])
                .collect::<Vec<f64>>()
        })
        .filter(|row| row.iter().all(|r| r.is_finite()))
        .collect();
    (rows.len() >= MIN_ROWS.max(histories.len())).then_some(rows)
}

fn column_means(rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows[0].len();
    (0..n)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / rows.len() as f64)
        .collect()
}

/// Sample covariance matrix.
fn covariance(rows: &[Vec<f64>], mean: &[f64]) -> Vec<Vec<f64>> {
    let n = mean.len();
    let denom = (rows.len() - 1) as f64;
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = rows
                .iter()
                .map(|r| (r[i] - mean[i]) * (r[j] - mean[j]))
                .sum::<f64>()
                / denom;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    cov
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
/// `None` when `a` is (numerically) singular.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|r| r.iter())
        .fold(0.0_f64, |m, x| m.max(x.abs()));
    if !(scale > 0.0) {
        return None;
    }

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= PIVOT_EPS * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
