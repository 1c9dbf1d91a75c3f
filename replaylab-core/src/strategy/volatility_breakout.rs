//! Volatility breakout.
//!
//! - `target` = open + k × previous bar's range. Entry when the bar's high
//!   reaches the target while the previous close sat above the trend filter.
//! - `filter` = SMA(close, filter_window). A close back below it on the entry
//!   bar is a whipsaw.
//! - `noise` = rolling mean of 1 − |open − close| / (high − low). Choppier
//!   tickers rank later when several trigger on the same day.
//! - Exit when a bar closes below its open or below the filter.

use super::indicators::{rolling_mean, shift};
use super::{input, positive_window, Strategy, StrategyError};
use crate::domain::{columns, Frame};
use crate::fingerprint::StrategyParams;

#[derive(Debug, Clone)]
pub struct VolatilityBreakout {
    k: f64,
    noise_window: usize,
    filter_window: usize,
}

impl VolatilityBreakout {
    pub fn new(k: f64, noise_window: usize, filter_window: usize) -> Result<Self, StrategyError> {
        if !(k.is_finite() && k > 0.0) {
            return Err(StrategyError::InvalidParameter {
                name: "k".into(),
                value: k,
                reason: "must be a positive number".into(),
            });
        }
        positive_window("noise_window", noise_window)?;
        positive_window("filter_window", filter_window)?;
        Ok(Self {
            k,
            noise_window,
            filter_window,
        })
    }
}

impl Default for VolatilityBreakout {
    fn default() -> Self {
        Self {
            k: 0.5,
            noise_window: 20,
            filter_window: 5,
        }
    }
}

/// Share of a bar's range not covered by its body. A zero-range bar counts
/// as pure noise.
fn bar_noise(open: f64, high: f64, low: f64, close: f64) -> f64 {
    let range = high - low;
    if range > 0.0 {
        1.0 - (open - close).abs() / range
    } else if range == 0.0 {
        1.0
    } else {
        f64::NAN
    }
}

impl Strategy for VolatilityBreakout {
    fn name(&self) -> &str {
        "volatility_breakout"
    }

    fn params(&self) -> StrategyParams {
        StrategyParams::new(self.name())
            .with("k", self.k)
            .with("noise_window", self.noise_window as f64)
            .with("filter_window", self.filter_window as f64)
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![
            columns::TARGET.to_string(),
            columns::FILTER.to_string(),
            columns::NOISE.to_string(),
        ]
    }

    fn calculate_indicators(&self, table: &Frame) -> Result<Frame, StrategyError> {
        let name = self.name();
        let open = input(name, table, columns::OPEN)?;
        let high = input(name, table, columns::HIGH)?;
        let low = input(name, table, columns::LOW)?;
        let close = input(name, table, columns::CLOSE)?;

        let range: Vec<f64> = high.iter().zip(low).map(|(h, l)| h - l).collect();
        let prev_range = shift(&range, 1);
        let target: Vec<f64> = open
            .iter()
            .zip(&prev_range)
            .map(|(o, r)| o + self.k * r)
            .collect();

        let raw_noise: Vec<f64> = (0..table.len())
            .map(|i| bar_noise(open[i], high[i], low[i], close[i]))
            .collect();
        let noise = rolling_mean(&raw_noise, self.noise_window);
        let filter = rolling_mean(close, self.filter_window);

        Ok(table
            .clone()
            .with_values(columns::TARGET, target)?
            .with_values(columns::NOISE, noise)?
            .with_values(columns::FILTER, filter)?)
    }

    fn generate_signals(&self, table: &Frame) -> Result<Frame, StrategyError> {
        let name = self.name();
        let open = input(name, table, columns::OPEN)?;
        let high = input(name, table, columns::HIGH)?;
        let close = input(name, table, columns::CLOSE)?;
        let target = input(name, table, columns::TARGET)?;
        let filter = input(name, table, columns::FILTER)?;

        let n = table.len();
        let mut entry = vec![false; n];
        let mut exit = vec![false; n];
        for i in 0..n {
            let trend_up = i > 0 && close[i - 1] > filter[i - 1];
            entry[i] = trend_up && target[i].is_finite() && high[i] >= target[i];
            exit[i] = close[i] < open[i] || close[i] < filter[i];
        }

        Ok(table
            .clone()
            .with_flags(columns::ENTRY_SIGNAL, entry)?
            .with_flags(columns::EXIT_SIGNAL, exit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::NaiveDate;

    fn frame(bars: &[(f64, f64, f64, f64)]) -> Frame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<Bar> = bars
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                Bar::new(start + chrono::Duration::days(i as i64), o, h, l, c, 1000.0)
            })
            .collect();
        Frame::from_bars(&bars).unwrap()
    }

    #[test]
    fn target_uses_previous_range() {
        let s = VolatilityBreakout::new(0.5, 1, 1).unwrap();
        let bars = [(100.0, 110.0, 90.0, 105.0), (104.0, 120.0, 100.0, 118.0)];
        let out = s.calculate_indicators(&frame(&bars)).unwrap();
        let target = out.values(columns::TARGET).unwrap();
        assert!(target[0].is_nan());
        assert_eq!(target[1], 104.0 + 0.5 * 20.0);
    }

    #[test]
    fn noise_of_full_body_bar_is_zero() {
        assert_eq!(bar_noise(90.0, 110.0, 90.0, 110.0), 0.0);
        assert_eq!(bar_noise(100.0, 110.0, 90.0, 100.0), 1.0);
        assert_eq!(bar_noise(100.0, 100.0, 100.0, 100.0), 1.0);
    }

    #[test]
    fn breakout_above_filter_signals_entry() {
        let s = VolatilityBreakout::new(0.5, 1, 1).unwrap();
        let out = s
            .prepare(&frame(&[
                (100.0, 102.0, 98.0, 101.0),
                (101.0, 110.0, 100.0, 109.0),
            ]))
            .unwrap();
        // target = 101 + 0.5 * 4 = 103, high 110 >= 103; prev close 101 > filter 101? no.
        assert!(!out.flag(columns::ENTRY_SIGNAL, 1));

        let s = VolatilityBreakout::new(0.5, 1, 2).unwrap();
        let out = s
            .prepare(&frame(&[
                (95.0, 97.0, 94.0, 96.0),
                (100.0, 102.0, 98.0, 101.0),
                (101.0, 110.0, 100.0, 109.0),
            ]))
            .unwrap();
        // filter[1] = 98.5 < close[1] = 101; target[2] = 101 + 0.5 * 4 = 103 <= 110
        assert!(out.flag(columns::ENTRY_SIGNAL, 2));
        assert!(!out.flag(columns::EXIT_SIGNAL, 2));
    }

    #[test]
    fn invalid_k_rejected() {
        assert!(VolatilityBreakout::new(0.0, 5, 5).is_err());
        assert!(VolatilityBreakout::new(f64::NAN, 5, 5).is_err());
    }
}
