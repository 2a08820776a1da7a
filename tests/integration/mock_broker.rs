//! Mock broker for integration testing.
//!
//! Serves candles and prices set from test code, records every order it
//! accepts, and can be told to fail. Rejects a reused client id the way
//! OANDA does. All in-memory.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::sync::{Arc, Mutex};

use fvg_breakout::broker::{MarketDataSource, OrderSink};
use fvg_breakout::types::*;

/// A recorded market order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub instrument: String,
    pub units: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub client_id: String,
}

#[derive(Default)]
pub struct MockBroker {
    hourly: Arc<Mutex<Vec<Candle>>>,
    intraday: Arc<Mutex<Vec<Candle>>>,
    price: Arc<Mutex<f64>>,
    orders: Arc<Mutex<Vec<PlacedOrder>>>,
    /// If set, order placement returns this error.
    force_error: Arc<Mutex<Option<String>>>,
    /// If set, orders are accepted but the reply is lost.
    drop_reply: Arc<Mutex<bool>>,
}

impl MockBroker {
    pub fn new(price: f64) -> Self {
        let broker = Self::default();
        *broker.price.lock().unwrap() = price;
        broker
    }

    pub fn set_hourly(&self, candles: Vec<Candle>) {
        *self.hourly.lock().unwrap() = candles;
    }

    pub fn set_intraday(&self, candles: Vec<Candle>) {
        *self.intraday.lock().unwrap() = candles;
    }

    pub fn push_intraday(&self, candle: Candle) {
        self.intraday.lock().unwrap().push(candle);
    }

    /// Force order placement to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Accept orders but answer with a transport timeout, as when the
    /// connection drops after the broker filled the order.
    pub fn set_drop_reply(&self, drop: bool) {
        *self.drop_reply.lock().unwrap() = drop;
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataSource for MockBroker {
    async fn get_candles(
        &self,
        _instrument: &str,
        granularity: Granularity,
        count: u32,
    ) -> Result<Vec<Candle>, BotError> {
        let candles = match granularity {
            Granularity::H1 => self.hourly.lock().unwrap().clone(),
            Granularity::M5 => self.intraday.lock().unwrap().clone(),
        };
        let skip = candles.len().saturating_sub(count as usize);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_latest_price(&self, _instrument: &str) -> Result<f64, BotError> {
        Ok(*self.price.lock().unwrap())
    }
}

#[async_trait]
impl OrderSink for MockBroker {
    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
        client_id: &str,
    ) -> Result<OrderConfirmation, BotError> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(BotError::Broker {
                status: 400,
                message: err.clone(),
            });
        }

        let mut orders = self.orders.lock().unwrap();
        if orders.iter().any(|o| o.client_id == client_id) {
            return Err(BotError::DuplicateOrder(client_id.to_string()));
        }
        orders.push(PlacedOrder {
            instrument: instrument.to_string(),
            units,
            stop_loss,
            take_profit,
            client_id: client_id.to_string(),
        });

        if *self.drop_reply.lock().unwrap() {
            return Err(BotError::Http("operation timed out".into()));
        }

        Ok(OrderConfirmation {
            order_id: format!("mock-{}", orders.len()),
            instrument: instrument.to_string(),
            units,
            fill_price: Some(*self.price.lock().unwrap()),
            dry_run: false,
            timestamp: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// New York wall-clock time on 2024-01-10 (or the day after, `day = 11`).
pub fn et(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    New_York
        .with_ymd_and_hms(2024, 1, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn candle(at: DateTime<Utc>, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: at,
        open: close,
        high,
        low,
        close,
        complete: true,
    }
}

/// Hourly history ending with the 19:00 range candle (high 150.5, low 150.2).
pub fn hourly_history() -> Vec<Candle> {
    vec![
        candle(et(10, 16, 0), 151.1, 150.7, 150.9),
        candle(et(10, 17, 0), 151.0, 150.6, 150.8),
        candle(et(10, 18, 0), 150.8, 150.3, 150.4),
        candle(et(10, 19, 0), 150.5, 150.2, 150.3),
    ]
}
