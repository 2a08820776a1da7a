//! Order executor.
//!
//! Turns entry decisions into broker orders. In dry-run mode the order is
//! logged and a synthetic confirmation is returned instead.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broker::OrderSink;
use crate::types::{BotError, OrderConfirmation, OrderRequest, TradeDecision};

pub struct Executor {
    sink: Option<Arc<dyn OrderSink>>,
    instrument: String,
    dry_run: bool,
}

impl Executor {
    pub fn new(sink: Option<Arc<dyn OrderSink>>, instrument: impl Into<String>, dry_run: bool) -> Self {
        Self {
            sink,
            instrument: instrument.into(),
            dry_run,
        }
    }

    /// Place the order behind an entry decision.
    ///
    /// Returns `Ok(None)` for decisions that carry no order. Errors are
    /// returned unchanged so the caller decides whether to latch. The
    /// client id is derived from the signal, so a resend after an unknown
    /// outcome comes back as [`BotError::DuplicateOrder`].
    pub async fn execute(
        &self,
        decision: &TradeDecision,
    ) -> Result<Option<OrderConfirmation>, BotError> {
        let Some(OrderRequest {
            units,
            stop_loss,
            take_profit,
            client_id,
        }) = decision.order_request()
        else {
            return Ok(None);
        };

        if self.dry_run {
            info!(
                instrument = %self.instrument,
                units,
                stop_loss,
                take_profit,
                client_id = %client_id,
                decision = %decision,
                "[DRY RUN] Would place order"
            );
            return Ok(Some(OrderConfirmation::dry_run(&self.instrument, units)));
        }

        let sink = self.sink.as_ref().ok_or_else(|| {
            BotError::Config("live execution requested without a broker client".into())
        })?;

        let confirmation = sink
            .place_market_order(&self.instrument, units, stop_loss, take_profit, &client_id)
            .await
            .map_err(|e| {
                warn!(
                    instrument = %self.instrument,
                    units,
                    client_id = %client_id,
                    error = %e,
                    "Order placement failed"
                );
                e
            })?;

        info!(%confirmation, "Order placed");
        Ok(Some(confirmation))
    }
}

// ---------------------------------------------------------------------------
// OrderConfirmation helpers
// ---------------------------------------------------------------------------

impl OrderConfirmation {
    /// Create a dry-run confirmation (no real execution).
    pub fn dry_run(instrument: &str, units: i64) -> Self {
        Self {
            order_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
            instrument: instrument.to_string(),
            units,
            fill_price: None,
            dry_run: true,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockOrderSink;
    use crate::types::{Direction, FvgBox, SkipReason, TradeLeg};
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn make_add_on(units: i64) -> TradeDecision {
        TradeDecision::EnterAddOn {
            fvg: FvgBox {
                direction: Direction::Bearish,
                lower: 150.20,
                upper: 150.30,
                formed_at: New_York.with_ymd_and_hms(2024, 1, 10, 20, 10, 0).unwrap(),
            },
            direction: Direction::Bearish,
            entry_price: 150.0,
            units,
            stop_loss: 150.15,
            take_profit: 149.85,
        }
    }

    fn make_confirmation(units: i64) -> OrderConfirmation {
        OrderConfirmation {
            order_id: "6372".into(),
            instrument: "USD_JPY".into(),
            units,
            fill_price: Some(150.002),
            dry_run: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dry_run_execution() {
        let mut sink = MockOrderSink::new();
        sink.expect_place_market_order().never();
        let executor = Executor::new(Some(Arc::new(sink)), "USD_JPY", true);

        let confirmation = executor.execute(&make_add_on(-50_000)).await.unwrap().unwrap();
        assert!(confirmation.dry_run);
        assert!(confirmation.order_id.starts_with("dry-run-"));
        assert_eq!(confirmation.units, -50_000);
        assert_eq!(confirmation.instrument, "USD_JPY");
    }

    #[tokio::test]
    async fn test_non_entry_is_skipped() {
        let executor = Executor::new(None, "USD_JPY", false);
        let skip = TradeDecision::NoTrade {
            leg: TradeLeg::AddOn,
            reason: SkipReason::DegenerateSizing,
        };
        assert!(executor.execute(&skip).await.unwrap().is_none());
        assert!(executor.execute(&TradeDecision::Reset).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_order_forwarded() {
        let mut sink = MockOrderSink::new();
        sink.expect_place_market_order()
            .withf(|instrument, units, sl, tp, client_id| {
                instrument == "USD_JPY"
                    && *units == -50_000
                    && *sl == 150.15
                    && *tp == 149.85
                    && client_id == "fvg-20240111T0110Z-add-on"
            })
            .times(1)
            .returning(|_, units, _, _, _| Ok(make_confirmation(units)));
        let executor = Executor::new(Some(Arc::new(sink)), "USD_JPY", false);

        let confirmation = executor.execute(&make_add_on(-50_000)).await.unwrap().unwrap();
        assert!(!confirmation.dry_run);
        assert_eq!(confirmation.order_id, "6372");
    }

    #[tokio::test]
    async fn test_broker_rejection_propagates() {
        let mut sink = MockOrderSink::new();
        sink.expect_place_market_order().returning(|_, _, _, _, _| {
            Err(BotError::Broker {
                status: 400,
                message: "INSUFFICIENT_MARGIN".into(),
            })
        });
        let executor = Executor::new(Some(Arc::new(sink)), "USD_JPY", false);

        let err = executor.execute(&make_add_on(-50_000)).await.unwrap_err();
        assert!(matches!(err, BotError::Broker { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_live_without_client_is_config_error() {
        let executor = Executor::new(None, "USD_JPY", false);
        let err = executor.execute(&make_add_on(1_000)).await.unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[test]
    fn test_dry_run_confirmation() {
        let confirmation = OrderConfirmation::dry_run("USD_JPY", 1_000);
        assert!(confirmation.to_string().ends_with("[DRY RUN]"));
        assert!(confirmation.fill_price.is_none());
    }
}
