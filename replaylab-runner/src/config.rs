//! Backtest configuration, loaded from TOML.
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```toml
//! initial_capital = 10000000.0
//! max_slots = 3
//!
//! [sizing]
//! method = "risk-parity"
//! lookback = 30
//!
//! [exits]
//! stop_loss_pct = 0.05
//!
//! [cache]
//! dir = ".replaylab/cache"
//! ttl_days = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::cache::CacheConfig;
use replaylab_core::engine::{EngineConfig, Variant};
use replaylab_core::orders::ExitRules;
use replaylab_core::sizing::{PositionSizer, SizingMethod, SizingParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Sizing section: method name plus the shared sizing parameters.
///
/// The method stays a string here. Unknown names and bad sizing parameters
/// are not a load-time error; they are reported when the engine config is
/// built and sizing falls back to an equal split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: String,
    #[serde(flatten)]
    pub params: SizingParams,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::Equal.as_str().to_string(),
            params: SizingParams::default(),
        }
    }
}

/// Cache section. Without a `dir` the cache lives in memory for the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: Option<PathBuf>,
    #[serde(flatten)]
    pub limits: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub fee_rate: f64,
    pub slippage_rate: f64,
    pub max_slots: usize,
    pub variant: Variant,
    pub use_cache: bool,
    pub interval: String,
    pub periods_per_year: f64,
    pub sizing: SizingConfig,
    pub exits: ExitRules,
    pub cache: CacheSettings,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000_000.0,
            fee_rate: 0.0005,
            slippage_rate: 0.0005,
            max_slots: 3,
            variant: Variant::default(),
            use_cache: true,
            interval: "day".to_string(),
            periods_per_year: 252.0,
            sizing: SizingConfig::default(),
            exits: ExitRules::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl BacktestConfig {
    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(invalid(
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        for (field, value) in [
            ("fee_rate", self.fee_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !(value.is_finite() && (0.0..1.0).contains(&value)) {
                return Err(invalid(field, format!("must be in [0, 1), got {value}")));
            }
        }
        if self.max_slots == 0 {
            return Err(invalid("max_slots", "must be at least 1"));
        }
        if self.interval.trim().is_empty() {
            return Err(invalid("interval", "must not be empty"));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(invalid("periods_per_year", "must be positive"));
        }
        if let Some((name, value)) = self.exits.first_invalid() {
            return Err(invalid("exits", format!("{name} must be non-negative, got {value}")));
        }


        if self.use_cache && self.cache.limits.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }
        Ok(())
    }

    /// Resolved sizing method. Unknown names and out-of-range sizing
    /// parameters log a warning and become `equal`.
    pub fn sizing_method(&self) -> SizingMethod {
        PositionSizer::from_name(&self.sizing.method, self.sizing.params.clone()).method()
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        let params = SizingParams {
            periods_per_year: self.periods_per_year,
            ..self.sizing.params.clone()
        };
        EngineConfig::new(self.initial_capital, self.max_slots)
            .with_costs(self.fee_rate, self.slippage_rate)
            .with_sizing(self.sizing_method(), params)
            .with_exits(self.exits)
            .with_variant(self.variant)
    }
}
