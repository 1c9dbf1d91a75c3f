//! Raw data access and the dense array layout the engine consumes.

pub mod arrays;
pub mod provider;
pub mod synthetic;

pub use arrays::{require_signal_columns, ArrayBuilder, Grid, MarketArrays};
pub use provider::{validate_ohlcv, DataError, MemoryOhlcvStore, OhlcvStore};
pub use synthetic::RandomWalk;
