//! RSI+MACD Trading Bot
//!
//! An automated spot trading bot for Binance built around three layers:
//! a clock synchronization service that keeps signed-request timestamps
//! inside the server's `recvWindow`, a retry wrapper that classifies
//! exchange failures and forces a resync on clock-skew rejections, and
//! the RSI+MACD signal engine with stop loss / take profit management.
//!
//! ## Market Data Example
//! ```no_run
//! use std::time::Duration;
//! use rsi_macd_bot::binance::{BinanceClient, ClientConfig};
//! use rsi_macd_bot::time_sync::{BinanceTimeSource, TimeSync};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let clock = TimeSync::new(BinanceTimeSource::new(false), Duration::from_secs(60));
//!     let client = BinanceClient::new(ClientConfig::default(), None, clock);
//!     let klines = client.get_klines("BTCUSDT", "5m", 100).await?;
//!     println!("Fetched {} klines", klines.len());
//!     Ok(())
//! }
//! ```

pub mod binance;
pub mod common;
pub mod config;
pub mod indicators;
pub mod notify;
pub mod state_manager;
pub mod strategy;
pub mod time_sync;
pub mod types;

pub use binance::auth::Credentials;
pub use binance::{BinanceClient, BinanceError, BinanceResult, ClientConfig};
pub use common::{with_resync, FailureKind, RetryPolicy};
pub use config::Config;
pub use strategy::Strategy;
pub use time_sync::{BinanceTimeSource, TimeSync};
pub use types::{Position, Signal, TradeRecord};
