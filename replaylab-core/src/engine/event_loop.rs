//! Day-by-day variant: derives returns, exits and candidates from the raw
//! grids as it walks the calendar.

use super::entries::{admit, rank_by_noise};
use super::state::{RunResult, SimulationState};
use super::SimulationEngine;
use crate::data::MarketArrays;
use crate::domain::ExitReason;

pub(crate) fn run(engine: &SimulationEngine, market: &MarketArrays) -> RunResult {
    let n_tickers = market.n_tickers();
    let n_days = market.n_days();
    let costs = engine.costs();
    let capital = engine.config().initial_capital;

    let mut state = SimulationState::new(capital, n_tickers, n_days);
    let mut exited_today = vec![false; n_tickers];

    for day in 0..n_days {
        let date = market.dates[day];
        exited_today.fill(false);

        // 1. Returns against the last valid close.
        for t in 0..n_tickers {
            if market.is_valid(t, day) {
                let close = market.close.get(t, day);
                let prev = state.last_valid_close[t];
                if prev.is_finite() {
                    state.returns[t][day] = close / prev - 1.0;
                }
                state.last_valid_close[t] = close;
            }
        }

        // 2. Risk exits outrank strategy exits.
        for t in 0..n_tickers {
            let close = market.close.get(t, day);
            let reason = match state.positions[t].as_mut() {
                Some(position) => engine
                    .orders()
                    .check(position, market.high.get(t, day), close),
                None => None,
            };
            if let Some(reason) = reason {
                state.close_position(&costs, t, date, close, reason);
                exited_today[t] = true;
            }
        }

        // 3. Signal exits.
        for t in 0..n_tickers {
            if state.is_open(t) && market.exit.get(t, day) && market.is_valid(t, day) {
                state.close_position(&costs, t, date, market.close.get(t, day), ExitReason::Signal);
                exited_today[t] = true;
            }
        }

        // 4. Entries.
        let mut candidates: Vec<usize> = (0..n_tickers)
            .filter(|&t| {
                !state.is_open(t)
                    && !exited_today[t]
                    && market.entry.get(t, day)
                    && market.is_valid(t, day)
            })
            .collect();
        rank_by_noise(&mut candidates, |t| market.noise.get(t, day));
        admit(engine, &mut state, market, day, date, &candidates);

        // 5. Equity; the last day closes everything first.
        if day + 1 == n_days {
            state.liquidate(&costs, date, |t| market.close.get(t, day));
        }
        state.mark_to_market(date, |t| market.close.get(t, day));
    }

    RunResult::from_state(market.tickers.clone(), capital, state)
}
