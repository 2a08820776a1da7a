//! Full-session replay against the mock broker.
//!
//! Walks one evening tick by tick: range capture, breakout, retest add-on
//! and the reset after the session closes.

use std::sync::Arc;

use fvg_breakout::broker::{MarketDataSource, OrderSink};
use fvg_breakout::config::SessionConfig;
use fvg_breakout::engine::executor::Executor;
use fvg_breakout::engine::session::{SessionPhase, SessionStateMachine};
use fvg_breakout::engine::Bot;
use fvg_breakout::strategy::{RiskConfig, RiskEngine};
use fvg_breakout::types::*;

use crate::mock_broker::{candle, et, hourly_history, MockBroker};

fn make_bot(broker: &Arc<MockBroker>, dry_run: bool) -> Bot {
    let machine = SessionStateMachine::new(
        SessionConfig::default(),
        RiskEngine::new(RiskConfig::default()),
    );
    let sink: Arc<dyn OrderSink> = broker.clone();
    let source: Arc<dyn MarketDataSource> = broker.clone();
    Bot::new(machine, Executor::new(Some(sink), "USD_JPY", dry_run), source)
}

fn bullish_bars() -> Vec<Candle> {
    vec![
        candle(et(10, 20, 0), 150.10, 150.00, 150.08),
        candle(et(10, 20, 5), 150.60, 150.30, 150.55),
        candle(et(10, 20, 10), 150.70, 150.45, 150.65),
    ]
}

#[tokio::test]
async fn test_bullish_session_replay() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history());
    let mut bot = make_bot(&broker, false);

    // Before the session opens.
    let report = bot.run_tick(et(10, 19, 30)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::NoAction);
    assert_eq!(report.phase, SessionPhase::Idle);

    // Range captured on the first in-session tick.
    let report = bot.run_tick(et(10, 20, 1)).await.unwrap();
    match report.decision {
        TradeDecision::SetRange(range) => {
            assert_eq!(range.high, 150.5);
            assert_eq!(range.low, 150.2);
        }
        other => panic!("expected SetRange, got {other:?}"),
    }

    // One bar is not a pattern.
    broker.set_intraday(bullish_bars()[..1].to_vec());
    let report = bot.run_tick(et(10, 20, 6)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::NoAction);
    assert_eq!(report.phase, SessionPhase::RangeSet);

    // Gap breakout above the range.
    broker.set_intraday(bullish_bars());
    let report = bot.run_tick(et(10, 20, 16)).await.unwrap();
    match &report.decision {
        TradeDecision::EnterBreakout { fvg, direction, .. } => {
            assert_eq!(*direction, Direction::Bullish);
            assert_eq!(fvg.lower, 150.10);
            assert_eq!(fvg.upper, 150.45);
        }
        other => panic!("expected EnterBreakout, got {other:?}"),
    }
    assert_eq!(report.phase, SessionPhase::BreakoutEntered);

    let orders = broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].instrument, "USD_JPY");
    assert_eq!(orders[0].units, 50_000);
    assert!((orders[0].stop_loss - 149.85).abs() < 1e-9);
    assert!((orders[0].take_profit - 150.15).abs() < 1e-9);

    // The breakout bar itself never counts as the retest.
    let report = bot.run_tick(et(10, 20, 17)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::NoAction);

    // Pullback into the gap that closes back above its floor.
    broker.push_intraday(candle(et(10, 20, 15), 150.60, 150.40, 150.55));
    let report = bot.run_tick(et(10, 20, 21)).await.unwrap();
    assert!(matches!(
        report.decision,
        TradeDecision::EnterAddOn {
            direction: Direction::Bullish,
            units: 50_000,
            ..
        }
    ));
    assert_eq!(report.phase, SessionPhase::AddOnEntered);
    let orders = broker.orders();
    assert_eq!(orders.len(), 2);
    assert_ne!(orders[0].client_id, orders[1].client_id);

    // Nothing more until the window closes, including after midnight.
    for now in [et(10, 22, 0), et(11, 0, 30), et(11, 2, 29)] {
        let report = bot.run_tick(now).await.unwrap();
        assert_eq!(report.decision, TradeDecision::NoAction);
        assert_eq!(report.phase, SessionPhase::AddOnEntered);
    }
    assert_eq!(broker.orders().len(), 2);

    // Session over.
    let report = bot.run_tick(et(11, 3, 0)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::Reset);
    assert!(bot.state().is_fresh());

    let report = bot.run_tick(et(11, 3, 5)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::NoAction);
}

#[tokio::test]
async fn test_rejected_breakout_is_retried() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history());
    broker.set_intraday(bullish_bars());
    let mut bot = make_bot(&broker, false);

    bot.run_tick(et(10, 20, 1)).await.unwrap();

    broker.set_error("MARKET_HALTED");
    let err = bot.run_tick(et(10, 20, 16)).await.unwrap_err();
    assert!(matches!(err, BotError::Broker { status: 400, .. }));
    assert!(!err.is_transient());
    assert_eq!(bot.phase(), SessionPhase::RangeSet);
    assert!(broker.orders().is_empty());

    broker.clear_error();
    let report = bot.run_tick(et(10, 20, 17)).await.unwrap();
    assert!(matches!(report.decision, TradeDecision::EnterBreakout { .. }));
    assert_eq!(broker.orders().len(), 1);
}

#[tokio::test]
async fn test_lost_order_reply_places_one_order() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history());
    broker.set_intraday(bullish_bars());
    let mut bot = make_bot(&broker, false);

    bot.run_tick(et(10, 20, 1)).await.unwrap();

    // Filled at the broker, but the reply never arrives.
    broker.set_drop_reply(true);
    let err = bot.run_tick(et(10, 20, 16)).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(bot.phase(), SessionPhase::RangeSet);
    assert_eq!(broker.orders().len(), 1);

    // The resend carries the same client id and is refused, which latches
    // the entry without a second fill.
    let report = bot.run_tick(et(10, 20, 17)).await.unwrap();
    assert!(matches!(report.decision, TradeDecision::EnterBreakout { .. }));
    assert!(report.order.is_none());
    assert_eq!(report.phase, SessionPhase::BreakoutEntered);

    let report = bot.run_tick(et(10, 20, 18)).await.unwrap();
    assert_eq!(report.decision, TradeDecision::NoAction);

    let orders = broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].units, 50_000);
    assert!(orders[0].client_id.ends_with("-breakout"));
}

#[tokio::test]
async fn test_dry_run_replay_places_nothing() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history());
    broker.set_intraday(bullish_bars());
    let mut bot = make_bot(&broker, true);

    bot.run_tick(et(10, 20, 1)).await.unwrap();
    let report = bot.run_tick(et(10, 20, 16)).await.unwrap();
    assert!(report.order.as_ref().is_some_and(|o| o.dry_run));
    assert_eq!(report.phase, SessionPhase::BreakoutEntered);
    assert!(broker.orders().is_empty());
}

#[tokio::test]
async fn test_bearish_breakout_sells() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history());
    broker.set_intraday(vec![
        candle(et(10, 20, 0), 150.45, 150.30, 150.35),
        candle(et(10, 20, 5), 150.25, 150.10, 150.12),
        candle(et(10, 20, 10), 150.20, 150.05, 150.08),
    ]);
    let mut bot = make_bot(&broker, false);

    bot.run_tick(et(10, 20, 1)).await.unwrap();
    let report = bot.run_tick(et(10, 20, 16)).await.unwrap();
    assert!(matches!(
        report.decision,
        TradeDecision::EnterBreakout {
            direction: Direction::Bearish,
            ..
        }
    ));

    let orders = broker.orders();
    assert_eq!(orders[0].units, -50_000);
    assert!((orders[0].stop_loss - 150.15).abs() < 1e-9);
    assert!((orders[0].take_profit - 149.85).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_range_candle_keeps_waiting() {
    let broker = Arc::new(MockBroker::new(150.0));
    broker.set_hourly(hourly_history()[..3].to_vec());
    let mut bot = make_bot(&broker, false);

    for now in [et(10, 20, 1), et(10, 21, 0)] {
        let report = bot.run_tick(now).await.unwrap();
        assert_eq!(report.decision, TradeDecision::NoAction);
        assert_eq!(report.phase, SessionPhase::RangePending);
    }

    broker.set_hourly(hourly_history());
    let report = bot.run_tick(et(10, 21, 1)).await.unwrap();
    assert!(matches!(report.decision, TradeDecision::SetRange(_)));
}
