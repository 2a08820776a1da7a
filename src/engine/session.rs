//! Session state machine.
//!
//! One call to [`SessionStateMachine::tick`] yields one [`TradeDecision`].
//! The caller owns the [`SessionState`]; the tick only latches the range
//! and resets the state on session boundaries. Entry flags latch through
//! [`SessionState::record_fill`] once the broker has accepted the order.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::broker::MarketDataSource;
use crate::config::SessionConfig;
use crate::strategy::risk::{RiskEngine, SizedEntry};
use crate::strategy::window::TimeWindow;
use crate::strategy::{compute_range, confirm_retest, find_fvg_breakout};
use crate::types::{
    BotError, Candle, FvgBox, Granularity, RangeBox, SkipReason, TradeDecision, TradeLeg,
};

pub use crate::types::SessionPhase;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Per-session state. Exactly one is live; a fresh default is the
/// "nothing known yet" state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Start of the session window this state belongs to.
    pub session_start: Option<DateTime<Tz>>,
    pub range: Option<RangeBox>,
    pub fvg: Option<FvgBox>,
    pub breakout_entered: bool,
    pub add_on_entered: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_session(start: DateTime<Tz>) -> Self {
        Self {
            session_start: Some(start),
            ..Self::default()
        }
    }

    /// Equivalent to a freshly constructed state.
    pub fn is_fresh(&self) -> bool {
        *self == Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.session_start.is_none() {
            SessionPhase::Idle
        } else if self.range.is_none() {
            SessionPhase::RangePending
        } else if !self.breakout_entered {
            SessionPhase::RangeSet
        } else if !self.add_on_entered {
            SessionPhase::BreakoutEntered
        } else {
            SessionPhase::AddOnEntered
        }
    }

    /// Latch an entry after the broker accepted it. Returns false for
    /// decisions that are not entries.
    pub fn record_fill(&mut self, decision: &TradeDecision) -> bool {
        match decision {
            TradeDecision::EnterBreakout { fvg, .. } => {
                self.fvg = Some(*fvg);
                self.breakout_entered = true;
                true
            }
            TradeDecision::EnterAddOn { .. } => {
                self.add_on_entered = true;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub struct SessionStateMachine {
    session: SessionConfig,
    risk: RiskEngine,
}

impl SessionStateMachine {
    pub fn new(session: SessionConfig, risk: RiskEngine) -> Self {
        Self { session, risk }
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Evaluate one polling tick.
    ///
    /// Checks run in order range → breakout → add-on and stop at the first
    /// stage that is not yet satisfied, so each tick yields one decision.
    pub async fn tick(
        &self,
        state: &mut SessionState,
        now_utc: DateTime<Utc>,
        source: &dyn MarketDataSource,
    ) -> Result<TradeDecision, BotError> {
        let tz = self.session.timezone;
        let window = self.session.trading_window.session_window(now_utc, tz)?;
        let now = now_utc.with_timezone(&tz);

        if !window.contains(&now) {
            if state.is_fresh() {
                return Ok(TradeDecision::NoAction);
            }
            info!(phase = %state.phase(), "Session window exited, resetting state");
            *state = SessionState::new();
            return Ok(TradeDecision::Reset);
        }

        if state.session_start != Some(window.start) {
            if !state.is_fresh() {
                info!(phase = %state.phase(), "New session window, discarding previous state");
            }
            *state = SessionState::for_session(window.start);
            info!(start = %window.start, end = %window.end, "Session started");
        }

        let range = match state.range {
            Some(range) => range,
            None => return self.capture_range(state, &window, source).await,
        };

        if state.add_on_entered {
            return Ok(TradeDecision::NoAction);
        }

        let candles = self
            .fetch(source, Granularity::M5, self.session.intraday_candle_count)
            .await?;

        if !state.breakout_entered {
            return self.check_breakout(&range, &candles, source).await;
        }

        match state.fvg {
            Some(fvg) => self.check_add_on(&range, &fvg, &candles, source).await,
            None => Ok(TradeDecision::NoAction),
        }
    }

    async fn fetch(
        &self,
        source: &dyn MarketDataSource,
        granularity: Granularity,
        count: u32,
    ) -> Result<Vec<Candle>, BotError> {
        let candles = source
            .get_candles(&self.session.instrument, granularity, count)
            .await?;
        if candles.is_empty() {
            return Err(BotError::DataUnavailable(format!(
                "no {granularity} candles for {}",
                self.session.instrument
            )));
        }
        Ok(candles)
    }

    async fn capture_range(
        &self,
        state: &mut SessionState,
        session: &TimeWindow,
        source: &dyn MarketDataSource,
    ) -> Result<TradeDecision, BotError> {
        let tz = self.session.timezone;
        let hourly = self
            .fetch(source, Granularity::H1, self.session.hourly_candle_count)
            .await?;
        let range_window = self
            .session
            .range_window
            .window_on(session.start.date_naive(), tz)?;

        match compute_range(&hourly, &range_window, tz) {
            Some(range) => {
                info!(
                    high = range.high,
                    low = range.low,
                    formed_at = %range.formed_at,
                    "Range set"
                );
                state.range = Some(range);
                Ok(TradeDecision::SetRange(range))
            }
            None => Ok(TradeDecision::NoAction),
        }
    }

    async fn check_breakout(
        &self,
        range: &RangeBox,
        candles: &[Candle],
        source: &dyn MarketDataSource,
    ) -> Result<TradeDecision, BotError> {
        let Some(fvg) = find_fvg_breakout(candles, range, self.session.timezone) else {
            return Ok(TradeDecision::NoAction);
        };
        info!(%fvg, "FVG breakout detected");

        let price = source.get_latest_price(&self.session.instrument).await?;
        match self.risk.size_breakout(price, range, fvg.direction) {
            Some(SizedEntry {
                direction,
                entry_price,
                units,
                stop_loss,
                take_profit,
            }) => Ok(TradeDecision::EnterBreakout {
                fvg,
                direction,
                entry_price,
                units,
                stop_loss,
                take_profit,
            }),
            None => {
                warn!(price, "Units computed as 0; skipping breakout");
                Ok(TradeDecision::NoTrade {
                    leg: TradeLeg::Breakout,
                    reason: SkipReason::DegenerateSizing,
                })
            }
        }
    }

    async fn check_add_on(
        &self,
        range: &RangeBox,
        fvg: &FvgBox,
        candles: &[Candle],
        source: &dyn MarketDataSource,
    ) -> Result<TradeDecision, BotError> {
        let Some(retest) = confirm_retest(candles, fvg, self.session.timezone) else {
            return Ok(TradeDecision::NoAction);
        };
        debug!(candle = %retest, "Retest confirmed");

        let price = source.get_latest_price(&self.session.instrument).await?;
        match self.risk.size_add_on(price, range, fvg.direction) {
            Some(entry) => Ok(TradeDecision::EnterAddOn {
                fvg: *fvg,
                direction: entry.direction,
                entry_price: entry.entry_price,
                units: entry.units,
                stop_loss: entry.stop_loss,
                take_profit: entry.take_profit,
            }),
            None => {
                warn!(price, "Units computed as 0; skipping add-on");
                Ok(TradeDecision::NoTrade {
                    leg: TradeLeg::AddOn,
                    reason: SkipReason::DegenerateSizing,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
