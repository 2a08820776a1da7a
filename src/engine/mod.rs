//! Core engine: the poll → decide → execute tick.

pub mod executor;
pub mod session;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::MarketDataSource;
use crate::types::{BotError, TickReport, TradeDecision};
use executor::Executor;
use session::{SessionPhase, SessionState, SessionStateMachine};

/// Owns the session state and drives one tick at a time.
pub struct Bot {
    machine: SessionStateMachine,
    executor: Executor,
    source: Arc<dyn MarketDataSource>,
    state: SessionState,
}

impl Bot {
    pub fn new(
        machine: SessionStateMachine,
        executor: Executor,
        source: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            machine,
            executor,
            source,
            state: SessionState::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Run one tick at `now_utc`.
    ///
    /// Entries are latched only once the order is confirmed. When placement
    /// fails the state is left as before the tick, so the same signal is
    /// evaluated again on the next poll. The resend reuses the signal's
    /// client id; a duplicate rejection means an earlier attempt went
    /// through, and the entry is latched then.
    pub async fn run_tick(&mut self, now_utc: DateTime<Utc>) -> Result<TickReport, BotError> {
        let decision = self
            .machine
            .tick(&mut self.state, now_utc, self.source.as_ref())
            .await?;

        let order = if decision.is_entry() {
            let confirmation = match self.executor.execute(&decision).await {
                Ok(confirmation) => confirmation,
                Err(BotError::DuplicateOrder(client_id)) => {
                    warn!(%client_id, "Order already accepted on an earlier attempt");
                    None
                }
                Err(e) => return Err(e),
            };
            self.state.record_fill(&decision);
            info!(phase = %self.state.phase(), "Entry latched");
            confirmation
        } else {
            if decision != TradeDecision::NoAction {
                info!(%decision, "Session update");
            } else {
                debug!(phase = %self.state.phase(), "No action");
            }
            None
        };

        Ok(TickReport {
            timestamp: now_utc,
            phase: self.state.phase(),
            decision,
            order,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
