//! Integration tests for the simulation engine.
//!
//! Tests:
//! 1. Round trip with fees and slippage on both legs
//! 2. Same-day candidates competing for one slot (noise tie-break)
//! 3. Risk exits outranking signal exits
//! 4. Whipsaw entries
//! 5. Gaps in the union calendar (valuation fallback)
//! 6. Variant equivalence and accounting identities on synthetic data

use chrono::NaiveDate;
use replaylab_core::data::{ArrayBuilder, MarketArrays, RandomWalk};
use replaylab_core::domain::{columns, ExitReason, Frame};
use replaylab_core::engine::{EngineConfig, EngineError, RunResult, SimulationEngine, Variant};
use replaylab_core::orders::ExitRules;
use replaylab_core::sizing::{SizingMethod, SizingParams};
use replaylab_core::strategy::{Strategy, VolatilityBreakout};

fn date(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
}

/// Minimal signal table: close doubles as high.
fn table(closes: &[f64], entry_days: &[usize], exit_days: &[usize]) -> Frame {
    let n = closes.len();
    let entry = (0..n).map(|i| entry_days.contains(&i)).collect();
    let exit = (0..n).map(|i| exit_days.contains(&i)).collect();
    Frame::new((0..n).map(date).collect())
        .unwrap()
        .with_values(columns::CLOSE, closes.to_vec())
        .unwrap()
        .with_values(columns::HIGH, closes.to_vec())
        .unwrap()
        .with_flags(columns::ENTRY_SIGNAL, entry)
        .unwrap()
        .with_flags(columns::EXIT_SIGNAL, exit)
        .unwrap()
}

fn market(tables: Vec<(&str, Frame)>) -> MarketArrays {
    let owned: Vec<(String, Frame)> = tables
        .into_iter()
        .map(|(t, f)| (t.to_string(), f))
        .collect();
    ArrayBuilder::new().build(&owned).unwrap()
}

/// Run both variants, require identical output, return one.
fn run(config: EngineConfig, market: &MarketArrays) -> RunResult {
    let engine = SimulationEngine::new(config).unwrap();
    let vectorized = engine.run_variant(market, Variant::Vectorized).unwrap();
    let event_loop = engine.run_variant(market, Variant::EventLoop).unwrap();
    assert_eq!(vectorized.snapshots, event_loop.snapshots);
    assert_eq!(vectorized.trades, event_loop.trades);
    vectorized
}

fn assert_accounting(result: &RunResult, max_slots: usize) {
    for snap in &result.snapshots {
        let drift = (snap.equity - (snap.cash + snap.positions_value)).abs();
        assert!(drift < 1e-6 * snap.equity.abs().max(1.0), "{snap:?}");
        assert!(snap.open_positions <= max_slots);
        assert!(snap.equity.is_finite());
    }
    let expected = result.initial_capital + result.total_pnl();
    assert!(
        (result.final_equity() - expected).abs() < 1e-6 * expected.abs().max(1.0),
        "final {} vs capital + pnl {}",
        result.final_equity(),
        expected
    );
    for trade in &result.trades {
        assert!(trade.pnl.is_finite());
        assert!(trade.pnl_pct.is_finite());
    }
}

// ──────────────────────────────────────────────
// Round trip
// ──────────────────────────────────────────────

#[test]
fn round_trip_with_costs_on_both_legs() {
    let m = market(vec![("AAA", table(&[100.0, 105.0, 110.0, 110.0], &[0], &[2]))]);
    let config = EngineConfig::new(10_000_000.0, 1).with_costs(0.0005, 0.0005);
    let result = run(config, &m);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Signal);
    assert_eq!(trade.entry_date, date(0));
    assert_eq!(trade.exit_date, date(2));
    assert!((trade.entry_price - 100.05).abs() < 1e-9);
    assert!((trade.exit_price - 109.945).abs() < 1e-9);

    let expected = ((110.0 * 0.9995) / (100.0 * 1.0005) - 1.0) * 100.0;
    assert!((trade.pnl_pct - expected).abs() < 1e-9, "pnl_pct {}", trade.pnl_pct);
    // pnl stays net of both commissions.
    let net = (110.0 * 0.9995 * 0.9995) / (100.0 * 1.0005 * 1.0005) - 1.0;
    assert!((trade.pnl - net * 10_000_000.0).abs() < 1e-3);
    assert!(trade.commission_cost > 0.0);
    assert!(trade.slippage_cost > 0.0);
    assert_accounting(&result, 1);
}

#[test]
fn position_held_to_the_end_closes_with_reason_open() {
    let m = market(vec![("AAA", table(&[100.0, 101.0, 102.0], &[0], &[]))]);
    let result = run(EngineConfig::new(1_000.0, 1), &m);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Open);
    assert_eq!(result.trades[0].exit_date, date(2));
    assert_eq!(result.snapshots.last().unwrap().open_positions, 0);
    assert_accounting(&result, 1);
}

// ──────────────────────────────────────────────
// Slot competition
// ──────────────────────────────────────────────

#[test]
fn lower_noise_wins_the_last_slot() {
    let a = table(&[50.0, 51.0, 52.0], &[0], &[])
        .with_values(columns::NOISE, vec![0.6, 0.6, 0.6])
        .unwrap();
    let b = table(&[80.0, 81.0, 82.0], &[0], &[])
        .with_values(columns::NOISE, vec![0.3, 0.3, 0.3])
        .unwrap();
    let m = market(vec![("AAA", a), ("BBB", b)]);
    let result = run(EngineConfig::new(1_000.0, 1), &m);

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].ticker, "BBB");
    assert_eq!(result.max_open_positions, 1);
    assert!(result.snapshots.iter().all(|s| s.open_positions <= 1));
}

#[test]
fn missing_noise_ranks_last_and_ties_keep_ticker_order() {
    let a = table(&[50.0, 51.0], &[0], &[]);
    let b = table(&[80.0, 81.0], &[0], &[])
        .with_values(columns::NOISE, vec![0.4, 0.4])
        .unwrap();
    let c = table(&[20.0, 21.0], &[0], &[])
        .with_values(columns::NOISE, vec![0.4, 0.4])
        .unwrap();
    let m = market(vec![("AAA", a), ("BBB", b), ("CCC", c)]);
    let result = run(EngineConfig::new(1_000.0, 2), &m);

    let mut held: Vec<&str> = result.trades.iter().map(|t| t.ticker.as_str()).collect();
    held.sort_unstable();
    assert_eq!(held, vec!["BBB", "CCC"]);
}

#[test]
fn equal_split_divides_cash_by_available_slots() {
    let m = market(vec![
        ("AAA", table(&[10.0, 10.0], &[0], &[])),
        ("BBB", table(&[20.0, 20.0], &[0], &[])),
    ]);
    let result = run(EngineConfig::new(1_000.0, 4), &m);
    // 1000 / 4, then 750 / 3.
    let first = &result.snapshots[0];
    assert!((first.cash - 500.0).abs() < 1e-9);
    assert!((first.positions_value - 500.0).abs() < 1e-9);
    assert_eq!(first.open_positions, 2);
}

// ──────────────────────────────────────────────
// Risk exits
// ──────────────────────────────────────────────

#[test]
fn stop_loss_overrides_signal_exit() {
    let m = market(vec![("AAA", table(&[100.0, 94.0, 94.0, 94.0], &[0], &[1]))]);
    let config = EngineConfig::new(1_000.0, 1).with_exits(ExitRules {
        stop_loss_pct: Some(0.05),
        ..ExitRules::default()
    });
    let result = run(config, &m);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    assert_eq!(result.trades[0].exit_date, date(1));
}

#[test]
fn stop_loss_without_any_exit_signal() {
    let m = market(vec![("AAA", table(&[100.0, 98.0, 94.0, 96.0], &[0], &[]))]);
    let config = EngineConfig::new(1_000.0, 1).with_exits(ExitRules {
        stop_loss_pct: Some(0.05),
        ..ExitRules::default()
    });
    let result = run(config, &m);
    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    assert_eq!(result.trades[0].exit_date, date(2));
    assert_eq!(result.snapshots[3].open_positions, 0);
}

#[test]
fn trailing_stop_follows_the_running_high() {
    let m = market(vec![(
        "AAA",
        table(&[100.0, 120.0, 130.0, 115.0, 140.0], &[0], &[]),
    )]);
    let config = EngineConfig::new(1_000.0, 1).with_exits(ExitRules {
        trailing_stop_pct: Some(0.10),
        ..ExitRules::default()
    });
    let result = run(config, &m);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::TrailingStop);
    assert_eq!(result.trades[0].exit_date, date(3));
}

#[test]
fn no_reentry_on_the_day_of_a_risk_exit() {
    let m = market(vec![(
        "AAA",
        table(&[100.0, 90.0, 90.0, 90.0], &[0, 1, 2], &[]),
    )]);
    let config = EngineConfig::new(1_000.0, 1).with_exits(ExitRules {
        stop_loss_pct: Some(0.05),
        ..ExitRules::default()
    });
    let result = run(config, &m);
    assert_eq!(result.snapshots[1].open_positions, 0);
    assert_eq!(result.snapshots[2].open_positions, 1);
    assert_eq!(result.trades[1].entry_date, date(2));
}

// ──────────────────────────────────────────────
// Whipsaw
// ──────────────────────────────────────────────

#[test]
fn entry_below_filter_is_a_whipsaw() {
    let frame = table(&[100.0, 101.0, 102.0], &[1], &[])
        .with_values(columns::TARGET, vec![f64::NAN, 103.0, f64::NAN])
        .unwrap()
        .with_values(columns::FILTER, vec![f64::NAN, 102.0, 101.0])
        .unwrap();
    let m = market(vec![("AAA", frame)]);
    let result = run(EngineConfig::new(1_000.0, 1), &m);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Whipsaw);
    assert_eq!(trade.entry_date, trade.exit_date);
    assert_eq!(trade.entry_price, 103.0);
    assert_eq!(trade.exit_price, 101.0);
    assert!(trade.pnl < 0.0);
    assert!(result.snapshots.iter().all(|s| s.open_positions == 0));
    assert_accounting(&result, 1);
}

// ──────────────────────────────────────────────
// Calendar gaps
// ──────────────────────────────────────────────

#[test]
fn missing_bar_values_at_last_valid_close() {
    let dates = vec![date(0), date(1), date(3)];
    let a = Frame::new(dates)
        .unwrap()
        .with_values(columns::CLOSE, vec![10.0, 12.0, 11.0])
        .unwrap()
        .with_flags(columns::ENTRY_SIGNAL, vec![true, false, false])
        .unwrap()
        .with_flags(columns::EXIT_SIGNAL, vec![false, false, false])
        .unwrap();
    let b = table(&[5.0, 5.0, 5.0, 5.0], &[], &[]);
    let m = market(vec![("AAA", a), ("BBB", b)]);
    assert_eq!(m.n_days(), 4);

    let result = run(EngineConfig::new(1_000.0, 1), &m);
    let gap = &result.snapshots[2];
    assert_eq!(gap.open_positions, 1);
    assert!((gap.positions_value - 1_200.0).abs() < 1e-9);
    assert!(result.daily_returns[0][2].is_nan());
    assert_accounting(&result, 1);
}

// ──────────────────────────────────────────────
// Synthetic end to end
// ──────────────────────────────────────────────

fn synthetic_market(n_tickers: usize, days: usize) -> MarketArrays {
    let strategy = VolatilityBreakout::default();
    let tables: Vec<(String, Frame)> = (0..n_tickers)
        .map(|i| {
            let raw = RandomWalk::default()
                .with_days(days)
                .with_seed(100 + i as u64)
                .frame();
            (format!("T{i:02}"), strategy.prepare(&raw).unwrap())
        })
        .collect();
    ArrayBuilder::new()
        .require(strategy.required_indicators())
        .build(&tables)
        .unwrap()
}

#[test]
fn variants_agree_for_every_sizing_method() {
    let m = synthetic_market(6, 250);
    for method in SizingMethod::ALL {
        let config = EngineConfig::new(1_000_000.0, 3)
            .with_costs(0.0005, 0.0005)
            .with_sizing(method, SizingParams::default())
            .with_exits(ExitRules {
                stop_loss_pct: Some(0.05),
                take_profit_pct: Some(0.2),
                trailing_stop_pct: Some(0.1),
            });
        let result = run(config, &m);
        assert!(!result.trades.is_empty(), "{method} produced no trades");
        assert_accounting(&result, 3);
    }
}

#[test]
fn replay_is_deterministic() {
    let m = synthetic_market(4, 200);
    let config = EngineConfig::new(100_000.0, 2).with_costs(0.001, 0.001);
    let engine = SimulationEngine::new(config).unwrap();
    let a = engine.run(&m).unwrap();
    let b = engine.run(&m).unwrap();
    assert_eq!(a.equity_curve(), b.equity_curve());
    assert_eq!(a.trades, b.trades);
}

#[test]
fn entry_and_exit_prices_respect_slippage() {
    let m = synthetic_market(4, 200);
    let slippage = 0.002;
    let result = run(EngineConfig::new(100_000.0, 2).with_costs(0.0, slippage), &m);
    for trade in &result.trades {
        let t = m.ticker_index(&trade.ticker).unwrap();
        let entry_day = m.date_index(trade.entry_date).unwrap();
        let reference = {
            let target = m.target.get(t, entry_day);
            if target.is_finite() && target > 0.0 {
                target
            } else {
                m.close.get(t, entry_day)
            }
        };
        assert!(trade.entry_price >= reference * (1.0 + slippage) - 1e-9);
        let exit_day = m.date_index(trade.exit_date).unwrap();
        assert!(trade.exit_price <= m.close.get(t, exit_day) * (1.0 - slippage) + 1e-9);
    }
}

#[test]
fn invalid_configuration_is_rejected() {
    assert_eq!(
        SimulationEngine::new(EngineConfig::new(0.0, 1)).unwrap_err(),
        EngineError::NonPositiveCapital(0.0)
    );
    assert_eq!(
        SimulationEngine::new(EngineConfig::new(1_000.0, 0)).unwrap_err(),
        EngineError::ZeroSlots
    );
    let bad_exit = EngineConfig::new(1_000.0, 1).with_exits(ExitRules {
        stop_loss_pct: Some(-0.1),
        ..ExitRules::default()
    });
    assert!(matches!(
        SimulationEngine::new(bad_exit),
        Err(EngineError::InvalidExitRule { name: "stop_loss_pct", .. })
    ));
}
