//! Stop/target placement and risk-based position sizing.
//!
//! Stops and targets sit half the session range away from the entry, so
//! every trade is 1:1 risk/reward. Size is the number of base-currency
//! units whose stop-out loses the USD risk budget, approximating the USD
//! value of a quote-currency move as `distance / entry_price` per unit.

use serde::Deserialize;
use tracing::debug;

use crate::types::{Direction, RangeBox};

/// Hard cap on the absolute size of any single order.
pub const MAX_UNITS: i64 = 1_000_000;

/// Absorbs binary representation error before flooring the unit count.
const UNIT_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Risk budgets in USD.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Risk of the initial breakout entry.
    pub initial_risk_usd: f64,
    /// Combined risk of breakout + add-on once both are on.
    pub add_on_total_risk_usd: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_risk_usd: 50.0,
            add_on_total_risk_usd: 100.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure math
// ---------------------------------------------------------------------------

/// `(stop_loss, take_profit)` half the range away from `entry_price`.
pub fn stop_loss_take_profit(
    entry_price: f64,
    range_high: f64,
    range_low: f64,
    direction: Direction,
) -> (f64, f64) {
    let half_range = (range_high - range_low).abs() / 2.0;
    match direction {
        Direction::Bullish => (entry_price - half_range, entry_price + half_range),
        Direction::Bearish => (entry_price + half_range, entry_price - half_range),
    }
}

/// Signed unit count risking `risk_usd` between entry and stop.
///
/// Returns 0 when the trade should be skipped: zero stop distance, a
/// non-positive entry or budget, or a size that floors to nothing.
pub fn position_size(risk_usd: f64, entry_price: f64, stop_loss: f64, direction: Direction) -> i64 {
    let distance = (entry_price - stop_loss).abs();
    if !(distance > 0.0) || !(entry_price > 0.0) || !(risk_usd > 0.0) || !risk_usd.is_finite() {
        return 0;
    }

    let risk_per_unit = distance / entry_price;
    let units = (risk_usd / risk_per_unit + UNIT_EPSILON).floor();
    if !units.is_finite() {
        return 0;
    }

    let capped = units.min(MAX_UNITS as f64) as i64;
    (capped * direction.sign()).clamp(-MAX_UNITS, MAX_UNITS)
}

/// Risk for the add-on leg alone: the total budget minus what the
/// breakout already risks, never negative.
pub fn add_on_leg_risk(initial_risk_usd: f64, add_on_total_risk_usd: f64) -> f64 {
    (add_on_total_risk_usd - initial_risk_usd).max(0.0)
}

// ---------------------------------------------------------------------------
// Risk engine
// ---------------------------------------------------------------------------

/// Sized order parameters for one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedEntry {
    pub direction: Direction,
    pub entry_price: f64,
    pub units: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Size the initial breakout entry. `None` means skip.
    pub fn size_breakout(&self, entry_price: f64, range: &RangeBox, direction: Direction) -> Option<SizedEntry> {
        self.size(self.config.initial_risk_usd, entry_price, range, direction)
    }

    /// Size the add-on entry. `None` means skip.
    pub fn size_add_on(&self, entry_price: f64, range: &RangeBox, direction: Direction) -> Option<SizedEntry> {
        let risk = add_on_leg_risk(self.config.initial_risk_usd, self.config.add_on_total_risk_usd);
        self.size(risk, entry_price, range, direction)
    }

    fn size(&self, risk_usd: f64, entry_price: f64, range: &RangeBox, direction: Direction) -> Option<SizedEntry> {
        let (stop_loss, take_profit) = stop_loss_take_profit(entry_price, range.high, range.low, direction);
        let units = position_size(risk_usd, entry_price, stop_loss, direction);

        if units == 0 {
            debug!(
                risk_usd,
                entry_price,
                stop_loss,
                %direction,
                "Position size is zero"
            );
            return None;
        }

        debug!(
            %direction,
            risk = format!("${:.2}", risk_usd),
            entry_price,
            stop_loss = format!("{:.3}", stop_loss),
            take_profit = format!("{:.3}", take_profit),
            units,
            "Entry sized"
        );

        Some(SizedEntry {
            direction,
            entry_price,
            units,
            stop_loss,
            take_profit,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
