//! Binance spot REST API client
//!
//! Public market-data endpoints plus the handful of signed endpoints the
//! bot needs (account, market orders, open orders). Signed requests are
//! timestamped from the shared [`crate::time_sync::TimeSync`] service and
//! routed through the retry-with-resync wrapper.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use client::{BinanceClient, ClientConfig};
pub use error::{BinanceError, BinanceResult};
