//! ReplayLab Core: indicator cache, dense market arrays, sizing, risk exits
//! and the slot-limited simulation engine.
//!
//! - Domain types (bars, tables, positions, trades)
//! - Fingerprinted, watermark-checked indicator cache with LRU/TTL/size eviction
//! - Ticker × day grids over a union calendar
//! - Position sizing (per-entry and batch allocation)
//! - Stop-loss / take-profit / trailing-stop checks
//! - Vectorized and event-loop engine variants with identical results

pub mod cache;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod orders;
pub mod sizing;
pub mod strategy;
