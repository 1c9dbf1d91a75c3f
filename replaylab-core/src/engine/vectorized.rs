//! Batch variant: computes every stateless quantity for the whole grid up
//! front (one pass per ticker row), then walks the calendar applying only
//! the stateful steps: slots, cash, and risk exits.

use super::entries::{admit, rank_by_noise};
use super::state::{RunResult, SimulationState};
use super::SimulationEngine;
use crate::data::MarketArrays;
use crate::domain::ExitReason;

struct Precomputed {
    /// Daily returns against the last valid close.
    returns: Vec<Vec<f64>>,
    /// Most recent valid close as of each day (inclusive).
    carried_close: Vec<Vec<f64>>,
    /// Tickers with a valid entry signal, ranked by noise.
    entries: Vec<Vec<usize>>,
    /// Tickers with a valid exit signal, in ticker order.
    exits: Vec<Vec<usize>>,
}

fn precompute(market: &MarketArrays) -> Precomputed {
    let n_tickers = market.n_tickers();
    let n_days = market.n_days();

    let mut returns = Vec::with_capacity(n_tickers);
    let mut carried_close = Vec::with_capacity(n_tickers);
    for t in 0..n_tickers {
        let closes = market.close.row(t);
        let mut ret = vec![f64::NAN; n_days];
        let mut carry = vec![f64::NAN; n_days];
        let mut last = f64::NAN;
        for (day, &close) in closes.iter().enumerate() {
            if close.is_finite() && close > 0.0 {
                if last.is_finite() {
                    ret[day] = close / last - 1.0;
                }
                last = close;
            }
            carry[day] = last;
        }
        returns.push(ret);
        carried_close.push(carry);
    }

    let mut entries = vec![Vec::new(); n_days];
    let mut exits = vec![Vec::new(); n_days];
    for t in 0..n_tickers {
        let entry_row = market.entry.row(t);
        let exit_row = market.exit.row(t);
        for day in 0..n_days {
            if !market.is_valid(t, day) {
                continue;
            }
            if entry_row[day] {
                entries[day].push(t);
            }
            if exit_row[day] {
                exits[day].push(t);
            }
        }
    }
    for (day, list) in entries.iter_mut().enumerate() {
        rank_by_noise(list, |t| market.noise.get(t, day));
    }

    Precomputed {
        returns,
        carried_close,
        entries,
        exits,
    }
}

pub(crate) fn run(engine: &SimulationEngine, market: &MarketArrays) -> RunResult {
    let n_tickers = market.n_tickers();
    let n_days = market.n_days();
    let costs = engine.costs();
    let capital = engine.config().initial_capital;

    let pre = precompute(market);
    let mut state = SimulationState::new(capital, n_tickers, n_days);
    // Sizing only ever reads `returns[t][..=day]`, so no look-ahead.
    state.returns = pre.returns;
    let mut exited_today = vec![false; n_tickers];

    for day in 0..n_days {
        let date = market.dates[day];
        exited_today.fill(false);
        for t in 0..n_tickers {
            state.last_valid_close[t] = pre.carried_close[t][day];
        }

        for t in 0..n_tickers {
            let Some(position) = state.positions[t].as_mut() else {
                continue;
            };
            let close = market.close.get(t, day);
            if let Some(reason) = engine
                .orders()
                .check(position, market.high.get(t, day), close)
            {
                state.close_position(&costs, t, date, close, reason);
                exited_today[t] = true;
            }
        }

        for &t in &pre.exits[day] {
            if state.close_position(&costs, t, date, market.close.get(t, day), ExitReason::Signal) {
                exited_today[t] = true;
            }
        }

        let candidates: Vec<usize> = pre.entries[day]
            .iter()
            .copied()
            .filter(|&t| !state.is_open(t) && !exited_today[t])
            .collect();
        admit(engine, &mut state, market, day, date, &candidates);

        if day + 1 == n_days {
            state.liquidate(&costs, date, |t| market.close.get(t, day));
        }
        state.mark_to_market(date, |t| market.close.get(t, day));
    }

    RunResult::from_state(market.tickers.clone(), capital, state)
}
