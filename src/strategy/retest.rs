//! Retest confirmation for the add-on entry.

use chrono_tz::Tz;

use crate::types::{Candle, Direction, FvgBox};

/// Whether the candle's range overlaps the gap box.
pub fn traded_into(candle: &Candle, fvg: &FvgBox) -> bool {
    match fvg.direction {
        Direction::Bullish => candle.low <= fvg.upper && candle.high >= fvg.lower,
        Direction::Bearish => candle.high >= fvg.lower && candle.low <= fvg.upper,
    }
}

/// Price came back into the box and closed on the breakout side of it.
pub fn is_retest_candle(candle: &Candle, fvg: &FvgBox) -> bool {
    if !traded_into(candle, fvg) {
        return false;
    }
    match fvg.direction {
        Direction::Bullish => candle.close > fvg.lower,
        Direction::Bearish => candle.close <= fvg.upper,
    }
}

/// Evaluate the most recent complete candle, which must open after the
/// candle that formed the box.
pub fn confirm_retest(candles: &[Candle], fvg: &FvgBox, tz: Tz) -> Option<Candle> {
    let last = candles.iter().rev().find(|c| c.complete)?;
    if last.local_time(tz) <= fvg.formed_at {
        return None;
    }
    is_retest_candle(last, fvg).then(|| last.clone())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
