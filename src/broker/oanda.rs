//! OANDA v20 REST integration.
//!
//! API docs: https://developer.oanda.com/rest-live-v20/introduction/
//! Practice base URL: https://api-fxpractice.oanda.com
//! Live base URL: https://api-fxtrade.oanda.com
//! Auth: `Authorization: Bearer {token}` on every request.
//!
//! Prices travel as decimal strings in both directions. Order SL/TP prices
//! must not exceed the instrument's display precision (3 dp for JPY pairs).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use rust_decimal::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{MarketDataSource, OrderSink};
use crate::config::Environment;
use crate::types::{BotError, Candle, Granularity, OpenPosition, OrderConfirmation};

/// Reject reason for an order whose client extension id is already in use.
const DUPLICATE_CLIENT_ID: &str = "CLIENT_ORDER_ID_ALREADY_EXISTS";

// ---------------------------------------------------------------------------
// API response types (OANDA JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<OandaCandle>,
}

#[derive(Debug, Deserialize)]
struct OandaCandle {
    time: String,
    #[serde(default)]
    complete: bool,
    /// Present when requested with `price=M`.
    mid: Option<OandaOhlc>,
}

#[derive(Debug, Deserialize)]
struct OandaOhlc {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    prices: Vec<OandaPrice>,
}

#[derive(Debug, Deserialize)]
struct OandaPrice {
    #[serde(default)]
    bids: Vec<PriceBucket>,
    #[serde(default)]
    asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_create_transaction: Option<TransactionRef>,
    order_fill_transaction: Option<FillTransaction>,
    order_cancel_transaction: Option<CancelTransaction>,
}

#[derive(Debug, Deserialize)]
struct TransactionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FillTransaction {
    id: String,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelTransaction {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<OandaPosition>,
}

#[derive(Debug, Deserialize)]
struct OandaPosition {
    instrument: String,
    long: PositionSide,
    short: PositionSide,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionSide {
    units: String,
    #[serde(default, rename = "unrealizedPL")]
    unrealized_pl: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// OANDA account client: market data, pricing and order placement.
pub struct OandaClient {
    http: Client,
    base_url: String,
    account_id: String,
    api_token: SecretString,
    price_precision: u32,
}

impl OandaClient {
    pub fn new(
        environment: Environment,
        account_id: String,
        api_token: SecretString,
        timeout_secs: u64,
        price_precision: u32,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("fvg-breakout/0.1.0")
            .build()
            .context("Failed to build HTTP client for OANDA")?;

        info!(
            environment = ?environment,
            base_url = environment.base_url(),
            "OANDA client ready"
        );

        Ok(Self {
            http,
            base_url: environment.base_url().to_string(),
            account_id,
            api_token,
            price_precision,
        })
    }

    // -- Internal helpers ------------------------------------------------

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, BotError> {
        debug!(url, "OANDA GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.api_token.expose_secret())
            .header("Accept-Datetime-Format", "RFC3339")
            .query(query)
            .send()
            .await?;
        Self::check_status(resp).await
    }

    /// Turn any non-2xx response into a broker error carrying the body.
    async fn check_status(resp: Response) -> Result<Response, BotError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BotError::Broker {
            status: status.as_u16(),
            message: body,
        })
    }

    fn parse_price(raw: &str) -> Result<f64, BotError> {
        raw.trim()
            .parse::<f64>()
            .map_err(|e| BotError::Parse(format!("invalid price '{raw}': {e}")))
    }

    fn parse_time(raw: &str) -> Result<DateTime<Utc>, BotError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| BotError::Parse(format!("invalid timestamp '{raw}': {e}")))
    }

    fn parse_candle(raw: &OandaCandle) -> Result<Candle, BotError> {
        let mid = raw
            .mid
            .as_ref()
            .ok_or_else(|| BotError::Parse(format!("candle at {} has no mid prices", raw.time)))?;
        Ok(Candle {
            timestamp: Self::parse_time(&raw.time)?,
            open: Self::parse_price(&mid.o)?,
            high: Self::parse_price(&mid.h)?,
            low: Self::parse_price(&mid.l)?,
            close: Self::parse_price(&mid.c)?,
            complete: raw.complete,
        })
    }

    fn mid_price(resp: &PricingResponse) -> Result<f64, BotError> {
        let quote = resp
            .prices
            .first()
            .ok_or_else(|| BotError::DataUnavailable("no pricing data returned".into()))?;
        let bid = quote
            .bids
            .first()
            .ok_or_else(|| BotError::DataUnavailable("empty bid side".into()))?;
        let ask = quote
            .asks
            .first()
            .ok_or_else(|| BotError::DataUnavailable("empty ask side".into()))?;
        Ok((Self::parse_price(&bid.price)? + Self::parse_price(&ask.price)?) / 2.0)
    }

    /// Round a price to `precision` decimal places for the order payload.
    pub fn format_price(price: f64, precision: u32) -> Result<String, BotError> {
        let mut d = Decimal::from_f64(price)
            .ok_or_else(|| BotError::Parse(format!("price {price} is not representable")))?;
        d.rescale(precision);
        Ok(d.to_string())
    }

    fn order_body(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
        client_id: &str,
    ) -> Result<serde_json::Value, BotError> {
        Ok(json!({
            "order": {
                "type": "MARKET",
                "instrument": instrument,
                "units": units.to_string(),
                "timeInForce": "FOK",
                "positionFill": "DEFAULT",
                "stopLossOnFill": { "price": Self::format_price(stop_loss, self.price_precision)? },
                "takeProfitOnFill": { "price": Self::format_price(take_profit, self.price_precision)? },
                "clientExtensions": { "id": client_id, "tag": "fvg-breakout" },
            }
        }))
    }

    /// OANDA rejects a reused client extension id with
    /// `CLIENT_ORDER_ID_ALREADY_EXISTS`: the earlier submission went through.
    fn classify_order_error(err: BotError, client_id: &str) -> BotError {
        match err {
            BotError::Broker { message, .. } if message.contains(DUPLICATE_CLIENT_ID) => {
                BotError::DuplicateOrder(client_id.to_string())
            }
            other => other,
        }
    }

    fn confirmation(
        resp: OrderResponse,
        instrument: &str,
        units: i64,
    ) -> Result<OrderConfirmation, BotError> {
        if let Some(cancel) = resp.order_cancel_transaction {
            return Err(BotError::Broker {
                status: 201,
                message: format!(
                    "order cancelled: {}",
                    cancel.reason.unwrap_or_else(|| "unknown reason".into())
                ),
            });
        }

        let (order_id, fill_price) = match (resp.order_fill_transaction, resp.order_create_transaction) {
            (Some(fill), _) => {
                let price = fill.price.as_deref().map(Self::parse_price).transpose()?;
                (fill.id, price)
            }
            (None, Some(create)) => (create.id, None),
            (None, None) => {
                return Err(BotError::Parse("order response carried no transaction".into()))
            }
        };

        Ok(OrderConfirmation {
            order_id,
            instrument: instrument.to_string(),
            units,
            fill_price,
            dry_run: false,
            timestamp: Utc::now(),
        })
    }

    /// Open positions on the account. Used for the startup summary only.
    pub async fn open_positions(&self) -> Result<Vec<OpenPosition>, BotError> {
        let url = format!("{}/v3/accounts/{}/openPositions", self.base_url, self.account_id);
        let resp: PositionsResponse = self
            .get(&url, &[])
            .await?
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("openPositions response: {e}")))?;
        resp.positions.iter().map(Self::parse_position).collect()
    }

    fn parse_position(raw: &OandaPosition) -> Result<OpenPosition, BotError> {
        let parse_units = |s: &str| {
            s.trim()
                .parse::<i64>()
                .map_err(|e| BotError::Parse(format!("invalid units '{s}': {e}")))
        };
        let upl = |side: &PositionSide| -> Result<f64, BotError> {
            side.unrealized_pl.as_deref().map(Self::parse_price).transpose().map(|v| v.unwrap_or(0.0))
        };
        Ok(OpenPosition {
            instrument: raw.instrument.clone(),
            long_units: parse_units(&raw.long.units)?,
            short_units: parse_units(&raw.short.units)?,
            unrealized_pl: upl(&raw.long)? + upl(&raw.short)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataSource for OandaClient {
    async fn get_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: u32,
    ) -> Result<Vec<Candle>, BotError> {
        let url = format!(
            "{}/v3/instruments/{}/candles",
            self.base_url,
            urlencoding::encode(instrument)
        );
        let query = [
            ("granularity", granularity.as_str().to_string()),
            ("count", count.to_string()),
            ("price", "M".to_string()),
        ];

        let resp: CandlesResponse = self
            .get(&url, &query)
            .await?
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("candles response: {e}")))?;

        let candles = resp
            .candles
            .iter()
            .map(Self::parse_candle)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(instrument, %granularity, count = candles.len(), "Candles fetched");
        Ok(candles)
    }

    async fn get_latest_price(&self, instrument: &str) -> Result<f64, BotError> {
        let url = format!("{}/v3/accounts/{}/pricing", self.base_url, self.account_id);
        let resp: PricingResponse = self
            .get(&url, &[("instruments", instrument.to_string())])
            .await?
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("pricing response: {e}")))?;
        let mid = Self::mid_price(&resp)?;
        debug!(instrument, mid, "Price fetched");
        Ok(mid)
    }
}

#[async_trait]
impl OrderSink for OandaClient {
    async fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
        take_profit: f64,
        client_id: &str,
    ) -> Result<OrderConfirmation, BotError> {
        let url = format!("{}/v3/accounts/{}/orders", self.base_url, self.account_id);
        let body = self.order_body(instrument, units, stop_loss, take_profit, client_id)?;

        debug!(instrument, units, client_id = %client_id, "Submitting market order");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let resp = Self::check_status(resp)
            .await
            .map_err(|e| Self::classify_order_error(e, client_id))?;

        let parsed: OrderResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Parse(format!("order response: {e}")))?;

        let confirmation = Self::confirmation(parsed, instrument, units).map_err(|e| {
            warn!(instrument, units, error = %e, "Order not filled");
            e
        })?;

        info!(
            order_id = %confirmation.order_id,
            instrument,
            units,
            fill_price = ?confirmation.fill_price,
            "Market order filled"
        );
        Ok(confirmation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
