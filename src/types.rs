//! Shared types for the FVG breakout bot.
//!
//! These types form the data model used across all modules.
//! Broker, strategy, and engine modules depend on them without
//! depending on each other.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One OHLC bar as delivered by the data source. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time (UTC).
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// False while the bar is still forming.
    pub complete: bool,
}

impl Candle {
    /// Bar open time converted to the session time zone.
    pub fn local_time(&self, tz: Tz) -> DateTime<Tz> {
        self.timestamp.with_timezone(&tz)
    }

    /// Whether this bar traded above `high` or below `low`.
    pub fn breaches(&self, high: f64, low: f64) -> bool {
        self.high > high || self.low < low
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O={} H={} L={} C={}{}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
            if self.complete { "" } else { " (forming)" },
        )
    }
}

/// Candle interval requested from the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Hourly bars, used for the session range.
    H1,
    /// Five-minute bars, used for the gap pattern and the retest.
    M5,
}

impl Granularity {
    /// Broker wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::H1 => "H1",
            Granularity::M5 => "M5",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Breakout direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// +1 for long units, -1 for short units.
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Bullish => 1,
            Direction::Bearish => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "BULLISH"),
            Direction::Bearish => write!(f, "BEARISH"),
        }
    }
}

/// Which entry of the session a decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeLeg {
    Breakout,
    AddOn,
}

impl fmt::Display for TradeLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeLeg::Breakout => write!(f, "breakout"),
            TradeLeg::AddOn => write!(f, "add-on"),
        }
    }
}

/// Why a fired signal did not produce an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Stop distance was zero or the position size rounded to zero units.
    DegenerateSizing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DegenerateSizing => write!(f, "position size computed as 0"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session boxes
// ---------------------------------------------------------------------------

/// High/low of the range-window candle. Invariant: `high >= low`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBox {
    pub high: f64,
    pub low: f64,
    /// Local open time of the candle the range was taken from.
    pub formed_at: DateTime<Tz>,
}

impl fmt::Display for RangeBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "range {:.3}-{:.3} @ {}",
            self.low,
            self.high,
            self.formed_at.format("%Y-%m-%d %H:%M %Z"),
        )
    }
}

/// Price gap left by a three-candle breakout. Invariant: `upper >= lower`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FvgBox {
    pub direction: Direction,
    pub lower: f64,
    pub upper: f64,
    /// Local open time of the third candle of the pattern.
    pub formed_at: DateTime<Tz>,
}

impl fmt::Display for FvgBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} FVG {:.3}-{:.3} @ {}",
            self.direction,
            self.lower,
            self.upper,
            self.formed_at.format("%H:%M %Z"),
        )
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Outcome of one polling tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    /// Nothing to do this tick.
    NoAction,
    /// The session window was exited and all session state was discarded.
    Reset,
    /// The session range was captured.
    SetRange(RangeBox),
    /// Open the initial position in the breakout direction.
    EnterBreakout {
        fvg: FvgBox,
        direction: Direction,
        entry_price: f64,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
    },
    /// Add to the position after a confirmed retest of the gap.
    EnterAddOn {
        fvg: FvgBox,
        direction: Direction,
        entry_price: f64,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
    },
    /// A signal fired but no order should be sent.
    NoTrade { leg: TradeLeg, reason: SkipReason },
}

/// Parameters of the market order behind an entry decision.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub units: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Derived from the signal, so a resend of the same entry carries the
    /// same id and the broker rejects it as a duplicate.
    pub client_id: String,
}

impl TradeDecision {
    pub fn order_request(&self) -> Option<OrderRequest> {
        let (fvg, leg, units, stop_loss, take_profit) = match self {
            TradeDecision::EnterBreakout {
                fvg,
                units,
                stop_loss,
                take_profit,
                ..
            } => (fvg, TradeLeg::Breakout, units, stop_loss, take_profit),
            TradeDecision::EnterAddOn {
                fvg,
                units,
                stop_loss,
                take_profit,
                ..
            } => (fvg, TradeLeg::AddOn, units, stop_loss, take_profit),
            _ => return None,
        };
        Some(OrderRequest {
            units: *units,
            stop_loss: *stop_loss,
            take_profit: *take_profit,
            client_id: client_order_id(fvg, leg),
        })
    }

    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            TradeDecision::EnterBreakout { .. } | TradeDecision::EnterAddOn { .. }
        )
    }
}

/// `fvg-<box time, UTC>-<leg>`, e.g. `fvg-20240111T0110Z-breakout`.
pub fn client_order_id(fvg: &FvgBox, leg: TradeLeg) -> String {
    format!(
        "fvg-{}-{leg}",
        fvg.formed_at.with_timezone(&Utc).format("%Y%m%dT%H%MZ")
    )
}

impl fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDecision::NoAction => write!(f, "no action"),
            TradeDecision::Reset => write!(f, "session reset"),
            TradeDecision::SetRange(range) => write!(f, "set {range}"),
            TradeDecision::EnterBreakout {
                direction,
                units,
                stop_loss,
                take_profit,
                ..
            } => write!(
                f,
                "enter {direction} breakout units={units} SL={stop_loss:.3} TP={take_profit:.3}"
            ),
            TradeDecision::EnterAddOn {
                direction,
                units,
                stop_loss,
                take_profit,
                ..
            } => write!(
                f,
                "enter {direction} add-on units={units} SL={stop_loss:.3} TP={take_profit:.3}"
            ),
            TradeDecision::NoTrade { leg, reason } => write!(f, "skip {leg}: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Broker acknowledgement of a market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub instrument: String,
    pub units: i64,
    /// Fill price, when the broker reports one.
    pub fill_price: Option<f64>,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for OrderConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} {} units={}", self.order_id, self.instrument, self.units)?;
        if let Some(price) = self.fill_price {
            write!(f, " @ {price}")?;
        }
        if self.dry_run {
            write!(f, " [DRY RUN]")?;
        }
        Ok(())
    }
}

/// Open position summary for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    pub long_units: i64,
    pub short_units: i64,
    pub unrealized_pl: f64,
}

impl OpenPosition {
    pub fn net_units(&self) -> i64 {
        self.long_units + self.short_units
    }
}

impl fmt::Display for OpenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} net={} (long={} short={}) uPL={:.2}",
            self.instrument,
            self.net_units(),
            self.long_units,
            self.short_units,
            self.unrealized_pl,
        )
    }
}

// ---------------------------------------------------------------------------
// Session phase and tick report
// ---------------------------------------------------------------------------

/// Where the current session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Outside the session, or state just reset.
    Idle,
    RangePending,
    RangeSet,
    BreakoutEntered,
    /// Terminal until the session ends.
    AddOnEntered,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::RangePending => "range-pending",
            SessionPhase::RangeSet => "range-set",
            SessionPhase::BreakoutEntered => "breakout-entered",
            SessionPhase::AddOnEntered => "add-on-entered",
        };
        f.write_str(s)
    }
}

/// Summary of a single polling tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub phase: SessionPhase,
    pub decision: TradeDecision,
    pub order: Option<OrderConfirmation>,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.phase,
            self.decision,
        )?;
        if let Some(order) = &self.order {
            write!(f, " -> {order}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// The data source returned nothing usable; retry on the next poll.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Broker error ({status}): {message}")]
    Broker { status: u16, message: String },

    /// The broker already holds an order with this client id.
    #[error("Duplicate order: client id {0} was already submitted")]
    DuplicateOrder(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BotError {
    /// Whether the loop should simply retry on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::DataUnavailable(_) | BotError::Http(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => BotError::Broker {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => BotError::Http(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
