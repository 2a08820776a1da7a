//! Session range capture.
//!
//! The reference range is the high/low of the single hourly candle that
//! opens inside the range window (half-open). Only complete candles count.

use chrono_tz::Tz;
use tracing::debug;

use super::window::TimeWindow;
use crate::types::{Candle, RangeBox};

/// First complete candle, in input order, whose local open time falls in
/// `[window.start, window.end)`.
pub fn compute_range(candles: &[Candle], window: &TimeWindow, tz: Tz) -> Option<RangeBox> {
    let found = candles.iter().find_map(|c| {
        let local = c.local_time(tz);
        (c.complete && window.contains_half_open(&local)).then(|| RangeBox {
            high: c.high,
            low: c.low,
            formed_at: local,
        })
    });

    if found.is_none() {
        debug!(
            candles = candles.len(),
            window_start = %window.start,
            window_end = %window.end,
            "No complete candle in range window yet"
        );
    }
    found
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
