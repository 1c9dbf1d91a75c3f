//! Cash and position accounting shared by both engine variants.
//!
//! Buy leg: fill = reference × (1 + slippage); the commission (fee × notional)
//! comes out of the allocated capital, so cash falls by exactly the capital.
//! Sell leg: fill = close × (1 − slippage); commission = fee × proceeds.
//! `pnl` = net proceeds − total cost. `pnl_pct` is the fill-to-fill move,
//! (exit fill / entry fill − 1) × 100, so it excludes commissions.

use chrono::NaiveDate;

use super::state::{DailySnapshot, SimulationState};
use crate::domain::{ExitReason, Position, Trade};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Costs {
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

/// Result of spending `capital` at `reference`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub amount: f64,
    pub commission: f64,
    pub slippage: f64,
}

impl Costs {
    pub fn buy(&self, capital: f64, reference: f64) -> Fill {
        let price = reference * (1.0 + self.slippage_rate);
        let notional = capital / (1.0 + self.fee_rate);
        let amount = notional / price;
        Fill {
            price,
            amount,
            commission: capital - notional,
            slippage: amount * (price - reference),
        }
    }

    pub fn sell(&self, amount: f64, reference: f64) -> Fill {
        let price = reference * (1.0 - self.slippage_rate);
        let gross = amount * price;
        Fill {
            price,
            amount,
            commission: gross * self.fee_rate,
            slippage: amount * (reference - price),
        }
    }
}

fn closed_trade(
    position: &Position,
    exit_date: NaiveDate,
    exit: &Fill,
    reason: ExitReason,
) -> (Trade, f64) {
    let net_proceeds = exit.amount * exit.price - exit.commission;
    let pnl = net_proceeds - position.cost_basis;
    let pnl_pct = if position.entry_price > 0.0 {
        (exit.price / position.entry_price - 1.0) * 100.0
    } else {
        0.0
    };
    let trade = Trade {
        ticker: position.ticker.clone(),
        entry_date: position.entry_date,
        entry_price: position.entry_price,
        exit_date,
        exit_price: exit.price,
        amount: position.amount,
        pnl,
        pnl_pct,
        exit_reason: reason,
        commission_cost: position.entry_commission + exit.commission,
        slippage_cost: position.entry_slippage + exit.slippage,
    };
    (trade, net_proceeds)
}

impl SimulationState {
    /// Open a resting position, occupying a slot.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        costs: &Costs,
        ticker: &str,
        ticker_index: usize,
        day: usize,
        date: NaiveDate,
        reference: f64,
        capital: f64,
    ) {
        let fill = costs.buy(capital, reference);
        self.cash -= capital;
        self.positions[ticker_index] = Some(Position {
            ticker: ticker.to_string(),
            ticker_index,
            entry_price: fill.price,
            entry_date: date,
            entry_day: day,
            amount: fill.amount,
            cost_basis: capital,
            entry_commission: fill.commission,
            entry_slippage: fill.slippage,
            highest_price_since_entry: fill.price,
        });
        self.open_count += 1;
        self.max_open_positions = self.max_open_positions.max(self.open_count);
    }

    /// Close the position held in `ticker_index` at `reference` (before
    /// slippage). Returns false when nothing was open.
    pub fn close_position(
        &mut self,
        costs: &Costs,
        ticker_index: usize,
        date: NaiveDate,
        reference: f64,
        reason: ExitReason,
    ) -> bool {
        let Some(position) = self.positions[ticker_index].take() else {
            return false;
        };
        let exit = costs.sell(position.amount, reference);
        let (trade, net_proceeds) = closed_trade(&position, date, &exit, reason);
        self.cash += net_proceeds;
        self.open_count -= 1;
        self.trades.push(trade);
        true
    }

    /// Same-bar entry and exit recorded as one trade. Never occupies a slot.
    #[allow(clippy::too_many_arguments)]
    pub fn whipsaw(
        &mut self,
        costs: &Costs,
        ticker: &str,
        ticker_index: usize,
        day: usize,
        date: NaiveDate,
        reference: f64,
        close: f64,
        capital: f64,
    ) {
        let buy = costs.buy(capital, reference);
        let position = Position {
            ticker: ticker.to_string(),
            ticker_index,
            entry_price: buy.price,
            entry_date: date,
            entry_day: day,
            amount: buy.amount,
            cost_basis: capital,
            entry_commission: buy.commission,
            entry_slippage: buy.slippage,
            highest_price_since_entry: buy.price,
        };
        let sell = costs.sell(buy.amount, close);
        let (trade, net_proceeds) = closed_trade(&position, date, &sell, ExitReason::Whipsaw);
        self.cash += net_proceeds - capital;
        self.trades.push(trade);
    }

    /// Price used to value a position: today's close, else the last valid
    /// close, else the entry price.
    pub fn valuation_price(&self, ticker_index: usize, close: f64) -> f64 {
        if close.is_finite() && close > 0.0 {
            return close;
        }
        let last = self.last_valid_close[ticker_index];
        if last.is_finite() && last > 0.0 {
            return last;
        }
        self.positions[ticker_index]
            .as_ref()
            .map(|p| p.entry_price)
            .unwrap_or(0.0)
    }

    /// Close every open position at its valuation price with reason `open`.
    pub fn liquidate(&mut self, costs: &Costs, date: NaiveDate, closes: impl Fn(usize) -> f64) {
        for t in 0..self.positions.len() {
            if self.positions[t].is_some() {
                let price = self.valuation_price(t, closes(t));
                self.close_position(costs, t, date, price, ExitReason::Open);
            }
        }
    }

    /// Record end-of-day equity and accumulate exposure.
    pub fn mark_to_market(&mut self, date: NaiveDate, closes: impl Fn(usize) -> f64) {
        let values: Vec<(usize, f64)> = self
            .positions
            .iter()
            .enumerate()
            .filter_map(|(t, p)| {
                p.as_ref()
                    .map(|pos| (t, pos.market_value(self.valuation_price(t, closes(t)))))
            })
            .collect();
        let positions_value: f64 = values.iter().map(|(_, v)| v).sum();
        let equity = self.cash + positions_value;
        if equity > 0.0 {
            for (t, value) in &values {
                self.exposure_sum[*t] += value / equity;
            }
        }
        self.snapshots.push(DailySnapshot {
            date,
            cash: self.cash,
            positions_value,
            equity,
            open_positions: self.open_count,
        });
    }
}
