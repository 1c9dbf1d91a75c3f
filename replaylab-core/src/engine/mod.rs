//! Simulation engine: the slot-limited daily state machine.
//!
//! Daily transition order, identical in both variants:
//! 1. Record each valid ticker's daily return.
//! 2. Risk exits (stop-loss / take-profit / trailing stop) on open positions.
//! 3. Signal exits on open positions with valid data.
//! 4. Entries: flat tickers with a valid entry signal, ranked by noise,
//!    admitted while slots remain; same-bar whipsaws realise immediately.
//! 5. Equity = cash + Σ amount × (close, else last valid close, else entry).
//!
//! On the last day every open position is closed with reason `open` before
//! equity is recorded.

pub mod entries;
mod event_loop;
pub mod ledger;
pub mod state;
mod vectorized;

use tracing::debug;

use crate::data::MarketArrays;
use crate::orders::OrderManager;
use crate::sizing::PositionSizer;

pub use ledger::Costs;
pub use state::{DailySnapshot, EngineConfig, EngineError, RunResult, SimulationState, Variant};

#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: EngineConfig,
    sizer: PositionSizer,
    orders: OrderManager,
}

impl SimulationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            sizer: PositionSizer::new(config.sizing_method, config.sizing.clone()),
            orders: OrderManager::new(config.exits),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn costs(&self) -> Costs {
        Costs {
            fee_rate: self.config.fee_rate,
            slippage_rate: self.config.slippage_rate,
        }
    }

    /// Run the configured variant.
    pub fn run(&self, market: &MarketArrays) -> Result<RunResult, EngineError> {
        self.run_variant(market, self.config.variant)
    }

    pub fn run_variant(
        &self,
        market: &MarketArrays,
        variant: Variant,
    ) -> Result<RunResult, EngineError> {
        if market.n_tickers() == 0 || market.n_days() == 0 {
            return Err(EngineError::EmptyMarket);
        }
        let result = match variant {
            Variant::Vectorized => vectorized::run(self, market),
            Variant::EventLoop => event_loop::run(self, market),
        };
        debug!(
            %variant,
            tickers = market.n_tickers(),
            days = market.n_days(),
            trades = result.trades.len(),
            final_equity = result.final_equity(),
            "simulation finished"
        );
        Ok(result)
    }
}
