//! Position sizing: capital to commit to an entry candidate.
//!
//! Single-candidate methods (`equal`, `volatility`, `fixed_risk`, `kelly`)
//! are evaluated per admission against the cash and free slots at that
//! moment. Batch methods (`inverse_volatility`, `mpt`, `risk_parity`) weight
//! the day's candidates jointly before admissions start.
//!
//! Every method degrades to an equal split of cash across free slots when
//! its inputs are insufficient; sizing never fails.

pub mod kelly;
pub mod optimize;
pub mod volatility;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    Equal,
    Volatility,
    FixedRisk,
    InverseVolatility,
    Mpt,
    RiskParity,
    Kelly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sizing method '{0}'")]
pub struct UnknownSizingMethod(pub String);

impl SizingMethod {
    pub const ALL: [SizingMethod; 7] = [
        SizingMethod::Equal,
        SizingMethod::Volatility,
        SizingMethod::FixedRisk,
        SizingMethod::InverseVolatility,
        SizingMethod::Mpt,
        SizingMethod::RiskParity,
        SizingMethod::Kelly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizingMethod::Equal => "equal",
            SizingMethod::Volatility => "volatility",
            SizingMethod::FixedRisk => "fixed_risk",
            SizingMethod::InverseVolatility => "inverse_volatility",
            SizingMethod::Mpt => "mpt",
            SizingMethod::RiskParity => "risk_parity",
            SizingMethod::Kelly => "kelly",
        }
    }

    /// Weighted jointly across the day's candidates.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            SizingMethod::InverseVolatility | SizingMethod::Mpt | SizingMethod::RiskParity
        )
    }
}

impl FromStr for SizingMethod {
    type Err = UnknownSizingMethod;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "equal" => Ok(SizingMethod::Equal),
            "volatility" => Ok(SizingMethod::Volatility),
            "fixed_risk" => Ok(SizingMethod::FixedRisk),
            "inverse_volatility" => Ok(SizingMethod::InverseVolatility),
            "mpt" | "mean_variance" => Ok(SizingMethod::Mpt),
            "risk_parity" => Ok(SizingMethod::RiskParity),
            "kelly" => Ok(SizingMethod::Kelly),
            _ => Err(UnknownSizingMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingParams {
    /// Days of return history used for volatility and covariance.
    pub lookback: usize,
    /// Annualised volatility target for `volatility`.
    pub target_volatility: f64,
    /// Cash fraction lost on a one-sigma move for `fixed_risk`.
    pub risk_fraction: f64,
    pub kelly_max_fraction: f64,
    pub kelly_min_trades: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Used to de-annualise `target_volatility`.
    pub periods_per_year: f64,
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            target_volatility: 0.15,
            risk_fraction: 0.01,
            kelly_max_fraction: 0.25,
            kelly_min_trades: 10,
            max_iterations: 200,
            tolerance: 1e-8,
            periods_per_year: 252.0,
        }
    }
}

impl SizingParams {
    /// First parameter outside its usable range, with the offending value.
    pub fn first_invalid(&self) -> Option<(&'static str, String)> {
        if self.lookback < 2 {
            return Some(("lookback", self.lookback.to_string()));
        }
        if self.max_iterations == 0 {
            return Some(("max_iterations", "0".to_string()));
        }
        [
            ("target_volatility", self.target_volatility),
            ("risk_fraction", self.risk_fraction),
            ("kelly_max_fraction", self.kelly_max_fraction),
            ("tolerance", self.tolerance),
        ]
        .into_iter()
        .find(|(_, v)| !(v.is_finite() && *v > 0.0))
        .map(|(name, v)| (name, v.to_string()))
    }
}

/// Inputs for sizing one candidate.
#[derive(Debug, Clone, Copy)]
pub struct SizingContext<'a> {
    pub cash: f64,
    pub available_slots: usize,
    /// The candidate's dense daily return history up to today (NaN for gaps).
    pub history: &'a [f64],
    /// Trade ledger so far.
    pub trades: &'a [Trade],
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    method: SizingMethod,
    params: SizingParams,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(SizingMethod::Equal, SizingParams::default())
    }
}

/// cash / available_slots, zero when no slot is free.
pub fn equal_split(cash: f64, available_slots: usize) -> f64 {
    if available_slots == 0 || !(cash > 0.0) {
        return 0.0;
    }
    cash / available_slots as f64
}

impl PositionSizer {
    pub fn new(method: SizingMethod, params: SizingParams) -> Self {
        Self { method, params }
    }

    /// Resolve a method by name. An unrecognised name or an out-of-range
    /// parameter is logged and sizing falls back to equal split.
    pub fn from_name(name: &str, params: SizingParams) -> Self {
        let method = name.parse::<SizingMethod>().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to equal position sizing");
            SizingMethod::Equal
        });
        if method != SizingMethod::Equal {
            if let Some((param, value)) = params.first_invalid() {
                warn!(
                    %method,
                    param,
                    value = %value,
                    "invalid sizing parameter, falling back to equal position sizing"
                );
                return Self::new(SizingMethod::Equal, params);
            }
        }
        Self::new(method, params)
    }

    pub fn method(&self) -> SizingMethod {
        self.method
    }

    pub fn params(&self) -> &SizingParams {
        &self.params
    }

    /// Capital for one candidate. Batch methods sized one at a time get the
    /// equal split. The result never exceeds cash.
    pub fn calculate(&self, ctx: &SizingContext<'_>) -> f64 {
        let equal = equal_split(ctx.cash, ctx.available_slots);
        let p = &self.params;
        let sized = match self.method {
            SizingMethod::Equal
            | SizingMethod::InverseVolatility
            | SizingMethod::Mpt
            | SizingMethod::RiskParity => Some(equal),
            SizingMethod::Volatility => {
                volatility::recent_volatility(ctx.history, p.lookback).map(|sigma| {
                    let target_daily = p.target_volatility / p.periods_per_year.max(1.0).sqrt();
                    volatility::volatility_scaled(equal, sigma, target_daily)
                })
            }
            SizingMethod::FixedRisk => volatility::recent_volatility(ctx.history, p.lookback)
                .map(|sigma| volatility::fixed_risk(ctx.cash, equal, sigma, p.risk_fraction)),
            SizingMethod::Kelly => {
                kelly::kelly_fraction(ctx.trades, p.kelly_min_trades, p.kelly_max_fraction)
                    .map(|f| ctx.cash * f)
            }
        };
        let capital = match sized {
            Some(c) if c.is_finite() && c >= 0.0 => c,
            _ => {
                debug!(method = %self.method, "insufficient data, sizing by equal split");
                equal
            }
        };
        capital.min(ctx.cash.max(0.0))
    }

    /// Joint weights for the day's first candidates (already in priority
    /// order). Falls back from the configured method to inverse volatility,
    /// then to equal weights.
    pub fn batch_weights(&self, histories: &[&[f64]]) -> Vec<f64> {
        let n = histories.len();
        if n == 0 {
            return Vec::new();
        }
        let p = &self.params;
        let primary = match self.method {
            SizingMethod::Mpt => optimize::mean_variance(histories, p.lookback),
            SizingMethod::RiskParity => {
                optimize::risk_parity(histories, p.lookback, p.max_iterations, p.tolerance)
            }
            SizingMethod::InverseVolatility => optimize::inverse_volatility(histories, p.lookback),
            _ => None,
        };
        primary
            .or_else(|| {
                if self.method != SizingMethod::InverseVolatility {
                    debug!(
                        method = %self.method,
                        candidates = n,
                        "batch optimisation fell back to inverse volatility"
                    );
                }
                optimize::inverse_volatility(histories, p.lookback)
            })
            .unwrap_or_else(|| {
                debug!(
                    method = %self.method,
                    candidates = n,
                    "batch sizing fell back to equal weights"
                );
                vec![1.0 / n as f64; n]
            })
    }

    /// Capital per candidate for a batch method: the budget for the batch is
    /// `cash × k / available_slots` where k = number of candidates sized
    /// together, split by [`PositionSizer::batch_weights`].
    pub fn batch_allocation(
        &self,
        cash: f64,
        available_slots: usize,
        histories: &[&[f64]],
    ) -> Vec<f64> {
        let k = histories.len().min(available_slots);
        if k == 0 {
            return Vec::new();
        }
        let budget = equal_split(cash, available_slots) * k as f64;
        self.batch_weights(&histories[..k])
            .into_iter()
            .map(|w| budget * w)
            .collect()
    }
}
