//! Fair value gap breakout detection.
//!
//! Looks at the last three complete short-interval candles (c1, c2, c3).
//! A bullish gap leaves `c1.high < c3.low`, a bearish gap `c1.low > c3.high`.
//! The gap only counts as a breakout when the range was broken by c2/c3,
//! c3 closes the move beyond the range on the gap side, and c1 was still
//! inside the range on that side.

use chrono_tz::Tz;
use tracing::debug;

use crate::types::{Candle, Direction, FvgBox, RangeBox};

/// Detect a gap breakout on the three most recent complete candles.
pub fn find_fvg_breakout(candles: &[Candle], range: &RangeBox, tz: Tz) -> Option<FvgBox> {
    let complete: Vec<&Candle> = candles.iter().filter(|c| c.complete).collect();
    let [c1, c2, c3] = match complete.as_slice() {
        [.., c1, c2, c3] => [*c1, *c2, *c3],
        _ => return None,
    };

    let direction = if c1.high < c3.low {
        Direction::Bullish
    } else if c1.low > c3.high {
        Direction::Bearish
    } else {
        return None;
    };

    let c1_breached = match direction {
        Direction::Bullish => c1.high > range.high,
        Direction::Bearish => c1.low < range.low,
    };
    if c1_breached {
        debug!(%direction, "Gap found but c1 already outside the range");
        return None;
    }

    if !(c2.breaches(range.high, range.low) || c3.breaches(range.high, range.low)) {
        return None;
    }

    let formed_at = c3.local_time(tz);
    match direction {
        Direction::Bullish if c3.high > range.high => Some(FvgBox {
            direction,
            lower: c1.high,
            upper: c3.low,
            formed_at,
        }),
        Direction::Bearish if c3.low < range.low => Some(FvgBox {
            direction,
            lower: c3.high,
            upper: c1.low,
            formed_at,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
