//! Property tests for engine and cache invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: replaying the same input yields identical output
//! 2. Variant equivalence: vectorized and event-loop runs agree
//! 3. Capital conservation: equity == cash + priced positions every day
//! 4. Slot bound: open positions never exceed max_slots
//! 5. Fill bounds: fills sit on the adverse side of the reference price
//! 6. Cache LRU: size bound, promotion on access, least-recent eviction

use chrono::NaiveDate;
use proptest::prelude::*;
use replaylab_core::cache::{CacheConfig, IndicatorCache, LruIndex};
use replaylab_core::data::{ArrayBuilder, MarketArrays};
use replaylab_core::domain::{columns, Frame};
use replaylab_core::engine::{EngineConfig, SimulationEngine, Variant};
use replaylab_core::fingerprint::{CacheKey, StrategyParams, Watermark};
use replaylab_core::orders::ExitRules;
use replaylab_core::sizing::{SizingMethod, SizingParams};

// ── Strategies (proptest) ────────────────────────────────────────────

#[derive(Debug, Clone)]
struct DayInput {
    ret: f64,
    present: bool,
    missing_close: bool,
    entry: bool,
    exit: bool,
    noise: f64,
    filter_gap: f64,
}

fn arb_day() -> impl Strategy<Value = DayInput> {
    (
        -0.08..0.08_f64,
        prop::bool::weighted(0.9),
        prop::bool::weighted(0.05),
        prop::bool::weighted(0.3),
        prop::bool::weighted(0.2),
        0.0..1.0_f64,
        -0.05..0.05_f64,
    )
        .prop_map(|(ret, present, missing_close, entry, exit, noise, filter_gap)| DayInput {
            ret,
            present,
            missing_close,
            entry,
            exit,
            noise,
            filter_gap,
        })
}

fn arb_market() -> impl Strategy<Value = Vec<Vec<DayInput>>> {
    (1usize..5, 3usize..40).prop_flat_map(|(tickers, days)| {
        prop::collection::vec(prop::collection::vec(arb_day(), days), tickers)
    })
}

fn arb_config() -> impl Strategy<Value = EngineConfig> {
    (
        1usize..4,
        0.0..0.01_f64,
        0.0..0.01_f64,
        0usize..SizingMethod::ALL.len(),
        prop::option::of(0.01..0.2_f64),
        prop::option::of(0.01..0.5_f64),
        prop::option::of(0.01..0.2_f64),
    )
        .prop_map(|(slots, fee, slippage, method, sl, tp, ts)| {
            EngineConfig::new(100_000.0, slots)
                .with_costs(fee, slippage)
                .with_sizing(SizingMethod::ALL[method], SizingParams {
                    lookback: 5,
                    kelly_min_trades: 2,
                    ..SizingParams::default()
                })
                .with_exits(ExitRules {
                    stop_loss_pct: sl,
                    take_profit_pct: tp,
                    trailing_stop_pct: ts,
                })
        })
}

fn build(inputs: &[Vec<DayInput>]) -> Option<MarketArrays> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut tables = Vec::new();
    for (t, days) in inputs.iter().enumerate() {
        let mut dates = Vec::new();
        let mut close = Vec::new();
        let mut filter = Vec::new();
        let mut noise = Vec::new();
        let mut entry = Vec::new();
        let mut exit = Vec::new();
        let mut price = 50.0 + 10.0 * t as f64;
        for (i, day) in days.iter().enumerate() {
            price *= 1.0 + day.ret;
            if !day.present {
                continue;
            }
            dates.push(start + chrono::Duration::days(i as i64));
            close.push(if day.missing_close { f64::NAN } else { price });
            filter.push(price * (1.0 + day.filter_gap));
            noise.push(day.noise);
            entry.push(day.entry);
            exit.push(day.exit);
        }
        if dates.is_empty() {
            continue;
        }
        let frame = Frame::new(dates)
            .ok()?
            .with_values(columns::CLOSE, close.clone())
            .ok()?
            .with_values(columns::HIGH, close.iter().map(|c| c * 1.01).collect())
            .ok()?
            .with_values(columns::FILTER, filter)
            .ok()?
            .with_values(columns::NOISE, noise)
            .ok()?
            .with_flags(columns::ENTRY_SIGNAL, entry)
            .ok()?
            .with_flags(columns::EXIT_SIGNAL, exit)
            .ok()?;
        tables.push((format!("T{t}"), frame));
    }
    ArrayBuilder::new().build(&tables).ok()
}

// ── 1-5. Engine ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replay_is_deterministic_and_variants_agree(inputs in arb_market(), config in arb_config()) {
        let Some(market) = build(&inputs) else { return Ok(()); };
        let engine = SimulationEngine::new(config).unwrap();
        let a = engine.run_variant(&market, Variant::Vectorized).unwrap();
        let b = engine.run_variant(&market, Variant::Vectorized).unwrap();
        let c = engine.run_variant(&market, Variant::EventLoop).unwrap();
        prop_assert_eq!(&a.snapshots, &b.snapshots);
        prop_assert_eq!(&a.trades, &b.trades);
        prop_assert_eq!(&a.snapshots, &c.snapshots);
        prop_assert_eq!(&a.trades, &c.trades);
    }

    #[test]
    fn capital_is_conserved(inputs in arb_market(), config in arb_config()) {
        let Some(market) = build(&inputs) else { return Ok(()); };
        let capital = config.initial_capital;
        let result = SimulationEngine::new(config).unwrap().run(&market).unwrap();
        for snap in &result.snapshots {
            prop_assert!(snap.equity.is_finite());
            prop_assert!(snap.cash >= -1e-6);
            prop_assert!((snap.equity - snap.cash - snap.positions_value).abs() < 1e-6);
        }
        let expected = capital + result.total_pnl();
        prop_assert!((result.final_equity() - expected).abs() < 1e-6 * expected.abs().max(1.0));
        for trade in &result.trades {
            prop_assert!(trade.pnl.is_finite());
            prop_assert!(trade.pnl_pct.is_finite());
            prop_assert!(trade.amount > 0.0);
        }
    }

    #[test]
    fn open_positions_never_exceed_slots(inputs in arb_market(), config in arb_config()) {
        let Some(market) = build(&inputs) else { return Ok(()); };
        let slots = config.max_slots;
        let result = SimulationEngine::new(config).unwrap().run(&market).unwrap();
        prop_assert!(result.max_open_positions <= slots);
        for snap in &result.snapshots {
            prop_assert!(snap.open_positions <= slots);
        }
    }

    #[test]
    fn fills_are_on_the_adverse_side(inputs in arb_market(), config in arb_config()) {
        let Some(market) = build(&inputs) else { return Ok(()); };
        let slippage = config.slippage_rate;
        let result = SimulationEngine::new(config).unwrap().run(&market).unwrap();
        for trade in &result.trades {
            let t = market.ticker_index(&trade.ticker).unwrap();
            let entry_day = market.date_index(trade.entry_date).unwrap();
            let entry_ref = market.close.get(t, entry_day);
            prop_assert!(trade.entry_price >= entry_ref * (1.0 + slippage) - 1e-9);

            let exit_day = market.date_index(trade.exit_date).unwrap();
            let exit_close = market.close.get(t, exit_day);
            if exit_close.is_finite() {
                prop_assert!(trade.exit_price <= exit_close * (1.0 - slippage) + 1e-9);
            }
        }
    }
}

// ── 6. Cache LRU ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Set(u8),
    Get(u8),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![(0u8..8).prop_map(Op::Set), (0u8..8).prop_map(Op::Get)],
        1..60,
    )
}

fn tiny_frame(seed: u8) -> Frame {
    let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    Frame::new(vec![d])
        .unwrap()
        .with_values(columns::CLOSE, vec![seed as f64 + 1.0])
        .unwrap()
}

proptest! {
    #[test]
    fn cache_behaves_like_an_lru_model(ops in arb_ops(), max_entries in 1usize..5) {
        let fp = StrategyParams::new("model").fingerprint();
        let wm = Watermark(0);
        let mut cache = IndicatorCache::in_memory(CacheConfig {
            max_entries,
            ttl_days: 0,
            ..CacheConfig::default()
        });
        // Model: most recent first.
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::Set(k) => {
                    cache.set(&format!("K{k}"), "day", &fp, wm, &tiny_frame(k)).unwrap();
                    model.retain(|&m| m != k);
                    model.insert(0, k);
                    model.truncate(max_entries);
                }
                Op::Get(k) => {
                    let hit = cache.get(&format!("K{k}"), "day", &fp, wm);
                    let expected = model.contains(&k);
                    prop_assert_eq!(hit.is_some(), expected);
                    if let Some(frame) = hit {
                        prop_assert_eq!(frame, tiny_frame(k));
                        model.retain(|&m| m != k);
                        model.insert(0, k);
                    }
                }
            }
            prop_assert!(cache.len() <= max_entries);
            let keys: Vec<CacheKey> = model
                .iter()
                .map(|k| CacheKey::new(&format!("K{k}"), "day", &fp))
                .collect();
            prop_assert_eq!(cache.keys(), keys);
        }
    }

    #[test]
    fn lru_index_pops_in_recency_order(keys in prop::collection::vec(0u16..50, 1..100)) {
        let mut index = LruIndex::new();
        let mut model: Vec<u16> = Vec::new();
        for k in keys {
            index.insert(k, ());
            model.retain(|&m| m != k);
            model.push(k);
        }
        prop_assert_eq!(index.len(), model.len());
        for expected in model {
            let (key, _) = index.pop_lru().unwrap();
            prop_assert_eq!(key, expected);
        }
        prop_assert!(index.is_empty());
    }
}
