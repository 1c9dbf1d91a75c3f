//! Parameter sweeps over strategy variants.
//!
//! Every variant loads its tables through the backtester's shared cache one
//! after another, then the simulations run in parallel on rayon. Outcomes come
//! back in input order, failures included.

use rayon::prelude::*;
use tracing::{debug, info};

use replaylab_core::data::OhlcvStore;
use replaylab_core::domain::Ticker;
use replaylab_core::fingerprint::Fingerprint;
use replaylab_core::strategy::{SmaCrossover, Strategy, VolatilityBreakout};

use crate::runner::{BacktestResult, Backtester, RunError};

/// Parameter grid for `SmaCrossover`. Pairs with `fast >= slow` are skipped.
#[derive(Debug, Clone)]
pub struct SmaGrid {
    pub fast: Vec<usize>,
    pub slow: Vec<usize>,
}

impl SmaGrid {
    pub fn strategies(&self) -> Vec<Box<dyn Strategy>> {
        let mut out: Vec<Box<dyn Strategy>> = Vec::new();
        for &fast in &self.fast {
            for &slow in &self.slow {
                if fast >= slow {
                    continue;
                }
                if let Ok(strategy) = SmaCrossover::new(fast, slow) {
                    out.push(Box::new(strategy));
                }
            }
        }
        out
    }
}

impl Default for SmaGrid {
    fn default() -> Self {
        Self {
            fast: vec![5, 10, 20],
            slow: vec![20, 50, 100],
        }
    }
}

/// Parameter grid for `VolatilityBreakout`.
#[derive(Debug, Clone)]
pub struct BreakoutGrid {
    pub k: Vec<f64>,
    pub noise_windows: Vec<usize>,
    pub filter_windows: Vec<usize>,
}

impl BreakoutGrid {
    pub fn size(&self) -> usize {
        self.k.len() * self.noise_windows.len() * self.filter_windows.len()
    }

    /// Invalid combinations (non-positive k, zero windows) are dropped.
    pub fn strategies(&self) -> Vec<Box<dyn Strategy>> {
        let mut out: Vec<Box<dyn Strategy>> = Vec::new();
        for &k in &self.k {
            for &noise in &self.noise_windows {
                for &filter in &self.filter_windows {
                    if let Ok(strategy) = VolatilityBreakout::new(k, noise, filter) {
                        out.push(Box::new(strategy));
                    }
                }
            }
        }
        out
    }
}

impl Default for BreakoutGrid {
    fn default() -> Self {
        Self {
            k: vec![0.3, 0.5, 0.7],
            noise_windows: vec![20],
            filter_windows: vec![3, 5, 10],
        }
    }
}

/// One strategy variant's outcome.
#[derive(Debug)]
pub struct SweepOutcome {
    pub strategy: String,
    pub fingerprint: Fingerprint,
    pub result: Result<BacktestResult, RunError>,
}

impl SweepOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub fn run_sweep(
    backtester: &Backtester,
    store: &dyn OhlcvStore,
    strategies: &[Box<dyn Strategy>],
    tickers: &[Ticker],
) -> Vec<SweepOutcome> {
    info!(variants = strategies.len(), tickers = tickers.len(), "sweep started");

    let loaded: Vec<_> = strategies
        .iter()
        .map(|s| backtester.load(store, s.as_ref(), tickers))
        .collect();

    let outcomes: Vec<SweepOutcome> = strategies
        .par_iter()
        .zip(loaded.into_par_iter())
        .map(|(strategy, tables)| {
            let result = tables.and_then(|t| backtester.simulate(strategy.as_ref(), &t));
            if let Err(e) = &result {
                debug!(strategy = strategy.name(), error = %e, "variant failed");
            }
            SweepOutcome {
                strategy: strategy.name().to_string(),
                fingerprint: strategy.fingerprint(),
                result,
            }
        })
        .collect();

    info!(
        variants = outcomes.len(),
        failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
        "sweep finished"
    );
    outcomes
}

/// Successful outcomes sorted by Sharpe ratio, best first.
pub fn ranked_by_sharpe(outcomes: &[SweepOutcome]) -> Vec<&BacktestResult> {
    let mut ok: Vec<&BacktestResult> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .collect();
    ok.sort_by(|a, b| b.metrics.sharpe.total_cmp(&a.metrics.sharpe));
    ok
}
