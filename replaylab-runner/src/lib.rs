//! ReplayLab Runner: backtest orchestration, metrics, sweeps, export.
//!
//! This crate builds on `replaylab-core` to provide:
//! - TOML configuration with defaults and validation
//! - A CSV-backed OHLCV store
//! - Cache-aware per-ticker loading that skips unusable tickers
//! - The `Backtester` entry point with performance and multi-asset risk metrics
//! - Parallel parameter sweeps sharing one indicator cache
//! - JSON and CSV artifact export
//! - `tracing` subscriber setup

pub mod config;
pub mod data_loader;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod risk_metrics;
pub mod runner;
pub mod store;
pub mod sweep;

pub use config::{BacktestConfig, CacheSettings, ConfigError, SizingConfig};
pub use data_loader::{DataLoader, LoadedTables, SkippedTicker};
pub use logging::{init_tracing, LogFormat};
pub use metrics::PerformanceMetrics;
pub use risk_metrics::RiskMetrics;
pub use runner::{BacktestResult, Backtester, EquityPoint, RunError, SCHEMA_VERSION};
pub use store::CsvStore;
pub use sweep::{run_sweep, BreakoutGrid, SmaGrid, SweepOutcome};
