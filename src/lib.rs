//! FVG-Breakout: session range fair-value-gap bot for OANDA FX.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod broker;
pub mod config;
pub mod engine;
pub mod strategy;
pub mod types;
