//! Seeded random-walk OHLCV generator for tests and benchmarks.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{Bar, Frame};

#[derive(Debug, Clone)]
pub struct RandomWalk {
    pub start: NaiveDate,
    /// Number of trading days (weekends are skipped).
    pub days: usize,
    pub start_price: f64,
    /// Mean daily log return.
    pub drift: f64,
    /// Daily log-return standard deviation.
    pub volatility: f64,
    pub seed: u64,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            days: 500,
            start_price: 100.0,
            drift: 0.0003,
            volatility: 0.015,
            seed: 42,
        }
    }
}

impl RandomWalk {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_days(mut self, days: usize) -> Self {
        self.days = days;
        self
    }

    pub fn bars(&self) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut bars = Vec::with_capacity(self.days);
        let mut date = self.start;
        let mut prev_close = self.start_price;

        while bars.len() < self.days {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                date = date.succ_opt().unwrap_or(date);
                continue;
            }
            let gap = standard_normal(&mut rng) * self.volatility * 0.3;
            let open = prev_close * gap.exp();
            let ret = self.drift + standard_normal(&mut rng) * self.volatility;
            let close = open * ret.exp();
            let wick_up = rng.gen::<f64>() * self.volatility * 0.5;
            let wick_down = rng.gen::<f64>() * self.volatility * 0.5;
            let high = open.max(close) * (1.0 + wick_up);
            let low = open.min(close) * (1.0 - wick_down);
            let volume = rng.gen_range(100_000.0..1_000_000.0_f64).round();

            bars.push(Bar::new(date, open, high, low, close, volume));
            prev_close = close;
            date = date.succ_opt().unwrap_or(date);
        }
        bars
    }

    pub fn frame(&self) -> Frame {
        // Generated dates are strictly ascending, so construction cannot fail.
        Frame::from_bars(&self.bars()).unwrap_or_default()
    }
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
