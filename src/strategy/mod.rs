//! Strategy building blocks: session windows, range capture, gap
//! detection, retest confirmation and risk sizing.
//!
//! Everything here is pure: no I/O, no clocks, no shared state. The
//! session state machine in [`crate::engine::session`] wires these
//! together one tick at a time.

pub mod fvg;
pub mod range;
pub mod retest;
pub mod risk;
pub mod window;

pub use fvg::find_fvg_breakout;
pub use range::compute_range;
pub use retest::{confirm_retest, is_retest_candle};
pub use risk::{position_size, stop_loss_take_profit, RiskConfig, RiskEngine};
pub use window::{TimeWindow, WindowSpec};
