//! Domain types for ReplayLab.

pub mod bar;
pub mod frame;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use frame::{columns, Frame, FrameError};
pub use position::Position;
pub use trade::{ExitReason, Trade};

/// Ticker type alias
pub type Ticker = String;
