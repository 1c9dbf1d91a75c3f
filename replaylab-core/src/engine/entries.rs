//! Slot-limited admission of the day's entry candidates.

use chrono::NaiveDate;
use tracing::debug;

use super::state::SimulationState;
use super::SimulationEngine;
use crate::data::MarketArrays;
use crate::sizing::SizingContext;

/// Order candidate tickers by ascending noise; missing noise ranks last,
/// ties keep ticker order.
pub fn rank_by_noise(candidates: &mut [usize], noise: impl Fn(usize) -> f64) {
    candidates.sort_by(|&a, &b| {
        let key = |t: usize| {
            let n = noise(t);
            if n.is_nan() {
                f64::INFINITY
            } else {
                n
            }
        };
        key(a).total_cmp(&key(b)).then(a.cmp(&b))
    });
}

/// Entry reference price: the strategy's target when usable, else close.
pub fn reference_price(target: f64, close: f64) -> f64 {
    if target.is_finite() && target > 0.0 {
        target
    } else {
        close
    }
}

/// Admit ranked candidates until slots run out. A candidate whose close is
/// already below its filter is realised as a whipsaw instead.
pub(crate) fn admit(
    engine: &SimulationEngine,
    state: &mut SimulationState,
    market: &MarketArrays,
    day: usize,
    date: NaiveDate,
    ranked: &[usize],
) {
    let max_slots = engine.config().max_slots;
    let costs = engine.costs();
    let sizer = engine.sizer();

    let available_at_start = max_slots.saturating_sub(state.open_count);
    if available_at_start == 0 || ranked.is_empty() {
        return;
    }

    let plan: Vec<f64> = if sizer.method().is_batch() {
        let histories: Vec<&[f64]> = ranked
            .iter()
            .take(available_at_start)
            .map(|&t| &state.returns[t][..=day])
            .collect();
        sizer.batch_allocation(state.cash, available_at_start, &histories)
    } else {
        Vec::new()
    };

    for (rank, &t) in ranked.iter().enumerate() {
        let available = max_slots.saturating_sub(state.open_count);
        if available == 0 {
            break;
        }
        let capital = match plan.get(rank) {
            Some(&c) => c,
            None => sizer.calculate(&SizingContext {
                cash: state.cash,
                available_slots: available,
                history: &state.returns[t][..=day],
                trades: &state.trades,
            }),
        }
        .min(state.cash);
        if !(capital.is_finite() && capital > 0.0) {
            debug!(ticker = %market.tickers[t], %date, "no capital for entry");
            continue;
        }

        let close = market.close.get(t, day);
        let reference = reference_price(market.target.get(t, day), close);
        let filter = market.filter.get(t, day);
        let ticker = market.tickers[t].as_str();

        if filter.is_finite() && close < filter {
            state.whipsaw(&costs, ticker, t, day, date, reference, close, capital);
        } else {
            state.open_position(&costs, ticker, t, day, date, reference, capital);
        }
    }
}
