//! Deterministic identification of strategy configurations and cache entries.
//!
//! - `StrategyParams`: a strategy's name plus its tunable parameters.
//! - `Fingerprint`: BLAKE3 over the name and key-sorted parameters.
//! - `CacheKey`: BLAKE3 over (ticker, interval, fingerprint).
//! - `Watermark`: a comparable timestamp marking the freshness of source data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A strategy's identity: stable name plus tunable parameters.
///
/// Uses `BTreeMap` for deterministic key ordering during serialization → hashing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyParams {
    pub name: String,
    pub params: BTreeMap<String, f64>,
}

impl StrategyParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Hash of name + parameters.
    ///
    /// Parameters are written as `{key}={bits}` in key order so that the hash
    /// does not depend on float formatting.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        for (key, value) in &self.params {
            hasher.update(b"\x1f");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(&value.to_bits().to_le_bytes());
        }
        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

/// Deterministic strategy fingerprint (hex BLAKE3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key for one (ticker, interval, fingerprint) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn new(ticker: &str, interval: &str, fingerprint: &Fingerprint) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ticker.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(interval.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(fingerprint.0.as_bytes());
        // 32 hex chars are plenty for a file name and keep paths short.
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically comparable source-data timestamp (seconds since the Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark(pub i64);

impl Watermark {
    /// Watermark at midnight UTC of `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.and_time(NaiveTime::MIN).and_utc().timestamp())
    }

    pub fn from_system_time(time: std::time::SystemTime) -> Self {
        let secs = match time.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> StrategyParams {
        StrategyParams::new("volatility_breakout")
            .with("k", 0.5)
            .with("noise_window", 20.0)
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(sample_params().fingerprint(), sample_params().fingerprint());
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = StrategyParams::new("s").with("a", 1.0).with("b", 2.0);
        let b = StrategyParams::new("s").with("b", 2.0).with("a", 1.0);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_for_params_and_name() {
        let base = sample_params();
        let other_param = sample_params().with("k", 0.6);
        let mut other_name = sample_params();
        other_name.name = "sma_crossover".into();
        assert_ne!(base.fingerprint(), other_param.fingerprint());
        assert_ne!(base.fingerprint(), other_name.fingerprint());
    }

    #[test]
    fn cache_key_separates_components() {
        let fp = sample_params().fingerprint();
        // "AB"+"C" must not collide with "A"+"BC"
        assert_ne!(CacheKey::new("AB", "C", &fp), CacheKey::new("A", "BC", &fp));
        assert_eq!(CacheKey::new("AAA", "day", &fp).as_str().len(), 32);
    }

    #[test]
    fn watermark_orders_by_date() {
        let a = Watermark::from_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let b = Watermark::from_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert!(a < b);
        assert_eq!(b.0 - a.0, 86_400);
    }
}
