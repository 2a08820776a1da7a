//! FVG-Breakout: session range fair-value-gap bot for OANDA FX.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the broker and runs the polling loop with graceful
//! shutdown.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use fvg_breakout::broker::oanda::OandaClient;
use fvg_breakout::broker::{MarketDataSource, OrderSink};
use fvg_breakout::config;
use fvg_breakout::engine::executor::Executor;
use fvg_breakout::engine::session::SessionStateMachine;
use fvg_breakout::engine::Bot;
use fvg_breakout::strategy::RiskEngine;
use fvg_breakout::types::TradeDecision;

const BANNER: &str = r#"
  _______      _______   ____                 _               _
 |  ___\ \    / / ____| | __ ) _ __ ___  __ _| | _____  _   _| |_
 | |_   \ \  / / |  _  |  _ \| '__/ _ \/ _` | |/ / _ \| | | | __|
 |  _|   \ \/ /| |_| | | |_) | | |  __/ (_| |   < (_) | |_| | |_
 |_|      \__/  \____| |____/|_|  \___|\__,_|_|\_\___/ \__,_|\__|

  Session range fair-value-gap breakout
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        instrument = %cfg.session.instrument,
        timezone = %cfg.session.timezone,
        poll_interval_secs = cfg.bot.poll_interval_secs,
        dry_run = cfg.bot.dry_run,
        initial_risk_usd = cfg.risk.initial_risk_usd,
        add_on_total_risk_usd = cfg.risk.add_on_total_risk_usd,
        "FVG-Breakout starting up"
    );

    // -- Initialise components -------------------------------------------

    let credentials = cfg.credentials()?;
    let client = Arc::new(OandaClient::new(
        cfg.broker.environment,
        credentials.account_id,
        credentials.api_token,
        cfg.broker.request_timeout_secs,
        cfg.session.price_precision,
    )?);

    match client.open_positions().await {
        Ok(positions) => {
            let mut open = positions
                .iter()
                .filter(|p| p.instrument == cfg.session.instrument)
                .peekable();
            if open.peek().is_none() {
                info!(instrument = %cfg.session.instrument, "No open position");
            }
            for position in open {
                info!(%position, "Open position at startup");
            }
        }
        Err(e) => warn!(error = %e, "Could not fetch open positions"),
    }

    let sink: Arc<dyn OrderSink> = client.clone();
    let source: Arc<dyn MarketDataSource> = client;
    let executor = Executor::new(Some(sink), cfg.session.instrument.clone(), cfg.bot.dry_run);
    let machine = SessionStateMachine::new(cfg.session.clone(), RiskEngine::new(cfg.risk.clone()));
    let mut bot = Bot::new(machine, executor, source);

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.bot.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.bot.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match bot.run_tick(Utc::now()).await {
                    Ok(report) => {
                        if report.decision != TradeDecision::NoAction {
                            info!(%report, "Tick complete");
                        }
                    }
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, phase = %bot.phase(), "Tick skipped, retrying next poll");
                    }
                    Err(e) => {
                        error!(error = %e, phase = %bot.phase(), "Tick failed, continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(phase = %bot.phase(), "FVG-Breakout shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fvg_breakout=info"));

    let json_logging = std::env::var("FVG_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
