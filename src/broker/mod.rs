//! Broker integrations.
//!
//! Defines the `MarketDataSource` and `OrderSink` traits the session
//! engine talks to, and the OANDA v20 REST implementation of both.

pub mod oanda;

use async_trait::async_trait;

use crate::types::{BotError, Candle, Granularity, OrderConfirmation};

/// Read side of the broker: candles and the current price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `count` candles, oldest first. The last one may
    /// still be forming.
    async fn get_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: u32,
    ) -> Result<Vec<Candle>, BotError>;

    /// Current mid price.
    async fn get_latest_price(&self, instrument: &str) -> Result<f64, BotError>;
}

/// Write side of the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderSink: Send + Sync {
    /// Place a market order with attached stop-loss and take-profit.
    /// Positive units buy, negative units sell. Any non-success response
    /// is returned as [`BotError::Broker`], except a reused `client_id`,
    /// which is [`BotError::DuplicateOrder`].
    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
        client_id: &str,
    ) -> Result<OrderConfirmation, BotError>;
}
