//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API token, account id) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::strategy::risk::RiskConfig;
use crate::strategy::window::WindowSpec;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub broker: BrokerConfig,
    pub session: SessionConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    pub poll_interval_secs: u64,
    /// Log orders instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub environment: Environment,
    pub api_token_env: String,
    pub account_id_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// OANDA account environment.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Practice,
    Live,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Practice => "https://api-fxpractice.oanda.com",
            Environment::Live => "https://api-fxtrade.oanda.com",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub instrument: String,
    /// IANA zone the windows are expressed in.
    pub timezone: Tz,
    pub trading_window: WindowSpec,
    pub range_window: WindowSpec,
    /// Hourly candles fetched while looking for the range.
    #[serde(default = "default_hourly_candle_count")]
    pub hourly_candle_count: u32,
    /// Five-minute candles fetched for the pattern and retest.
    #[serde(default = "default_intraday_candle_count")]
    pub intraday_candle_count: u32,
    /// Decimal places accepted by the broker for SL/TP prices.
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instrument: "USD_JPY".to_string(),
            timezone: chrono_tz::America::New_York,
            trading_window: WindowSpec::new(20, 0, 2, 30),
            range_window: WindowSpec::new(19, 0, 20, 0),
            hourly_candle_count: default_hourly_candle_count(),
            intraday_candle_count: default_intraday_candle_count(),
            price_precision: default_price_precision(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_hourly_candle_count() -> u32 {
    48
}
fn default_intraday_candle_count() -> u32 {
    30
}
fn default_price_precision() -> u32 {
    3
}

/// Broker secrets resolved from the environment.
#[derive(Debug)]
pub struct BrokerCredentials {
    pub api_token: SecretString,
    pub account_id: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the strategy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bot.poll_interval_secs == 0 {
            anyhow::bail!("bot.poll_interval_secs must be > 0");
        }
        if self.session.instrument.trim().is_empty() {
            anyhow::bail!("session.instrument must not be empty");
        }
        self.session
            .trading_window
            .validate()
            .context("Invalid session.trading_window")?;
        self.session
            .range_window
            .validate()
            .context("Invalid session.range_window")?;
        if self.session.hourly_candle_count == 0 || self.session.intraday_candle_count < 3 {
            anyhow::bail!("need at least 1 hourly and 3 intraday candles per request");
        }
        if !(self.risk.initial_risk_usd > 0.0) {
            anyhow::bail!("risk.initial_risk_usd must be > 0");
        }
        if !(self.risk.add_on_total_risk_usd >= 0.0) {
            anyhow::bail!("risk.add_on_total_risk_usd must be >= 0");
        }
        Ok(())
    }

    /// Resolve the broker token and account id named in the config.
    pub fn credentials(&self) -> Result<BrokerCredentials> {
        let token = Self::resolve_env(&self.broker.api_token_env)?;
        let account_id = Self::resolve_env(&self.broker.account_id_env)?;
        if token.trim().is_empty() || account_id.trim().is_empty() {
            anyhow::bail!(
                "Missing {} or {} in environment",
                self.broker.api_token_env,
                self.broker.account_id_env
            );
        }
        Ok(BrokerCredentials {
            api_token: SecretString::new(token.trim().to_string()),
            account_id: account_id.trim().to_string(),
        })
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
