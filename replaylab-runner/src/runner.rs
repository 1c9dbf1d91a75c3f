//! Backtest runner: wires together config, data loading, the engine, and metrics.
//!
//! Two steps, usable separately:
//! - `Backtester::load()`: per-ticker tables through the shared cache.
//! - `Backtester::simulate()`: dense arrays, engine run, metrics. No I/O.
//!
//! `Backtester::run()` does both. Sweeps load sequentially and simulate in
//! parallel, so the split matters there.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use replaylab_core::cache::{CacheError, IndicatorCache, ParquetStore, SharedCache};
use replaylab_core::data::{ArrayBuilder, DataError, OhlcvStore};
use replaylab_core::domain::{Ticker, Trade};
use replaylab_core::engine::{EngineError, SimulationEngine, Variant};
use replaylab_core::fingerprint::{Fingerprint, StrategyParams};
use replaylab_core::strategy::Strategy;

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{DataLoader, LoadedTables, SkippedTicker};
use crate::metrics::{period_returns, PerformanceMetrics};
use crate::risk_metrics::RiskMetrics;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy: StrategyParams,
    pub fingerprint: Fingerprint,
    /// Tickers that made it into the simulation, in column order.
    pub tickers: Vec<Ticker>,
    pub skipped: Vec<SkippedTicker>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub variant: Variant,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
    /// `None` when the run is too short for tail statistics.
    pub risk: Option<RiskMetrics>,
    pub max_open_positions: usize,
    pub cache_hits: usize,
}

/// Default schema version for older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

pub struct Backtester {
    config: BacktestConfig,
    engine: SimulationEngine,
    cache: Option<SharedCache>,
}

impl Backtester {
    /// Validate the config and build the engine.
    ///
    /// With `use_cache` and no cache supplied, one is opened from the config:
    /// on disk under `cache.dir`, otherwise in memory.
    pub fn new(config: BacktestConfig, cache: Option<SharedCache>) -> Result<Self, RunError> {
        config.validate()?;
        let engine = SimulationEngine::new(config.to_engine_config())?;

        let cache = match (config.use_cache, cache) {
            (false, _) => None,
            (true, Some(shared)) => Some(shared),
            (true, None) => {
                let limits = config.cache.limits.clone();
                let cache = match &config.cache.dir {
                    Some(dir) => IndicatorCache::open(limits, ParquetStore::open(dir)?)?,
                    None => IndicatorCache::in_memory(limits),
                };
                Some(cache.into_shared())
            }
        };

        Ok(Self {
            config,
            engine,
            cache,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    pub fn load(
        &self,
        store: &dyn OhlcvStore,
        strategy: &dyn Strategy,
        tickers: &[Ticker],
    ) -> Result<LoadedTables, RunError> {
        let loaded = DataLoader::new(store, &self.config.interval)
            .with_cache(self.cache.as_ref())
            .load(strategy, tickers)?;
        Ok(loaded)
    }

    /// Run the engine over already prepared tables.
    pub fn simulate(
        &self,
        strategy: &dyn Strategy,
        loaded: &LoadedTables,
    ) -> Result<BacktestResult, RunError> {
        let market = ArrayBuilder::new()
            .require(strategy.required_indicators())
            .build(&loaded.tables)?;
        info!(
            strategy = strategy.name(),
            tickers = market.n_tickers(),
            days = market.n_days(),
            start = ?market.first_date(),
            end = ?market.last_date(),
            variant = %self.config.variant,
            "backtest started"
        );

        let run = self.engine.run(&market)?;
        let equity_curve = run.equity_curve();
        let metrics = PerformanceMetrics::compute(
            run.initial_capital,
            &equity_curve,
            &run.trades,
            self.config.periods_per_year,
        );

        let portfolio_equity: Vec<f64> = std::iter::once(run.initial_capital)
            .chain(equity_curve.iter().map(|(_, e)| *e))
            .collect();
        let risk = RiskMetrics::compute(
            &run.tickers,
            &run.daily_returns,
            &period_returns(&portfolio_equity),
            &run.average_exposure,
            self.config.periods_per_year,
        );

        let result = BacktestResult {
            schema_version: SCHEMA_VERSION,
            strategy: strategy.params(),
            fingerprint: strategy.fingerprint(),
            start_date: run.first_date(),
            end_date: run.last_date(),
            variant: self.config.variant,
            initial_capital: run.initial_capital,
            final_equity: run.final_equity(),
            equity_curve: equity_curve
                .into_iter()
                .map(|(date, equity)| EquityPoint { date, equity })
                .collect(),
            metrics,
            risk,
            max_open_positions: run.max_open_positions,
            skipped: loaded.skipped.clone(),
            cache_hits: loaded.cache_hits,
            tickers: run.tickers,
            trades: run.trades,
        };
        info!(
            strategy = strategy.name(),
            trades = result.trades.len(),
            final_equity = result.final_equity,
            total_return = result.metrics.total_return,
            "backtest finished"
        );
        Ok(result)
    }

    pub fn run(
        &self,
        store: &dyn OhlcvStore,
        strategy: &dyn Strategy,
        tickers: &[Ticker],
    ) -> Result<BacktestResult, RunError> {
        let loaded = self.load(store, strategy, tickers)?;
        self.simulate(strategy, &loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::data::{MemoryOhlcvStore, RandomWalk};
    use replaylab_core::strategy::VolatilityBreakout;

    fn store() -> MemoryOhlcvStore {
        let mut store = MemoryOhlcvStore::new();
        for (i, t) in ["AAA", "BBB", "CCC"].iter().enumerate() {
            let frame = RandomWalk::default().with_days(120).with_seed(i as u64 + 1).frame();
            store.insert(t, "day", frame);
        }
        store
    }

    fn tickers() -> Vec<Ticker> {
        vec!["AAA".into(), "BBB".into(), "CCC".into()]
    }

    #[test]
    fn run_reports_consistent_equity() {
        let backtester = Backtester::new(BacktestConfig::default(), None).unwrap();
        let result = backtester
            .run(&store(), &VolatilityBreakout::default(), &tickers())
            .unwrap();

        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.tickers, tickers());
        assert_eq!(result.final_equity, result.equity_curve.last().unwrap().equity);
        let pnl: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert!((result.final_equity - (result.initial_capital + pnl)).abs() < 1e-6);
        assert!(result.max_open_positions <= 3);
        assert_eq!(result.metrics.total_trades, result.trades.len());
    }

    #[test]
    fn cache_disabled_means_no_cache() {
        let config = BacktestConfig {
            use_cache: false,
            ..BacktestConfig::default()
        };
        let backtester = Backtester::new(config, None).unwrap();
        assert!(backtester.cache().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = BacktestConfig {
            max_slots: 0,
            ..BacktestConfig::default()
        };
        assert!(matches!(Backtester::new(config, None), Err(RunError::Config(_))));
    }

    #[test]
    fn bad_sizing_parameters_still_run_with_equal_split() {
        let mut config = BacktestConfig::default();
        config.sizing.method = "fixed-risk".into();
        config.sizing.params.risk_fraction = 0.0;
        config.sizing.params.lookback = 1;
        let backtester = Backtester::new(config, None).unwrap();

        let result = backtester
            .run(&store(), &VolatilityBreakout::default(), &tickers())
            .unwrap();
        let equal = Backtester::new(BacktestConfig::default(), None)
            .unwrap()
            .run(&store(), &VolatilityBreakout::default(), &tickers())
            .unwrap();
        assert_eq!(result.trades, equal.trades);
        assert_eq!(result.final_equity, equal.final_equity);
    }

    #[test]
    fn no_usable_tickers_is_a_data_error() {
        let backtester = Backtester::new(BacktestConfig::default(), None).unwrap();
        let err = backtester
            .run(&store(), &VolatilityBreakout::default(), &["ZZZ".to_string()])
            .unwrap_err();
        assert!(matches!(err, RunError::Data(DataError::NoUsableTickers)));
    }
}
