//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub time_sync: TimeSyncConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub strategy: StrategyParams,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from JSON file. API credentials are never read
    /// from the file; they come from the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.trading.symbols.is_empty() {
            anyhow::bail!("At least one trading symbol is required");
        }
        if !crate::binance::types::is_valid_interval(&self.trading.timeframe) {
            anyhow::bail!("Unknown timeframe: {}", self.trading.timeframe);
        }
        if self.trading.stop_loss_pct <= 0.0 || self.trading.take_profit_pct <= 0.0 {
            anyhow::bail!("Stop loss and take profit percentages must be positive");
        }
        if self.trading.trading_hours_start > 23 || self.trading.trading_hours_end > 23 {
            anyhow::bail!("Trading hours must be within 0..=23");
        }
        if self.strategy.rsi_oversold >= self.strategy.rsi_overbought {
            anyhow::bail!("RSI oversold threshold must sit below the overbought threshold");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            exchange: ExchangeConfig::default(),
            time_sync: TimeSyncConfig::default(),
            trading: TradingConfig::default(),
            strategy: StrategyParams::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub testnet: bool,
    /// Timestamp tolerance sent as `recvWindow` on signed requests, ms
    pub recv_window_ms: u64,
    pub max_retry_attempts: u32,
    /// Minimum gap between consecutive REST requests, ms
    pub min_request_gap_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            testnet: false,
            recv_window_ms: 120_000,
            max_retry_attempts: 3,
            min_request_gap_ms: 100,
        }
    }
}

/// Clock synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSyncConfig {
    /// Offset is considered stale after this many seconds
    pub sync_interval_seconds: u64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        TimeSyncConfig {
            sync_interval_seconds: 60,
        }
    }
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub timeframe: String,
    /// Quote currency spent per entry
    pub trade_amount_quote: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_positions: usize,
    /// UTC hour the bot starts evaluating signals
    pub trading_hours_start: u32,
    /// UTC hour the bot stops evaluating signals (inclusive)
    pub trading_hours_end: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
                "XRPUSDT".to_string(),
            ],
            timeframe: "5m".to_string(),
            trade_amount_quote: 100.0,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            max_positions: 5,
            trading_hours_start: 0,
            trading_hours_end: 23,
        }
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// RSI above this forces an exit from any open position
    pub rsi_emergency_exit: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub ema_filter_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub volume_lookback: usize,
    /// Minimum klines required before any signal is produced
    pub min_candles: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_emergency_exit: 80.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            ema_filter_period: 200,
            bollinger_period: 20,
            bollinger_std: 2.0,
            volume_lookback: 20,
            min_candles: 50,
        }
    }
}

/// Notification configuration. Tokens come from the environment, not the
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub telegram_enabled: bool,
    /// Notify on every trade, not just errors
    pub notify_trades: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            telegram_enabled: true,
            notify_trades: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.exchange.recv_window_ms, 120_000);
        assert_eq!(config.time_sync.sync_interval_seconds, 60);
        assert_eq!(config.trading.timeframe, "5m");
        assert_eq!(config.strategy.rsi_period, 14);
    }

    #[test]
    fn test_parse_overrides() {
        let json = r#"{
            "exchange": {
                "testnet": true,
                "recv_window_ms": 60000,
                "max_retry_attempts": 5,
                "min_request_gap_ms": 250
            },
            "trading": {
                "symbols": ["BTCUSDT"],
                "timeframe": "1h",
                "trade_amount_quote": 50.0,
                "stop_loss_pct": 1.0,
                "take_profit_pct": 3.0,
                "max_positions": 2,
                "trading_hours_start": 8,
                "trading_hours_end": 20
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert!(config.exchange.testnet);
        assert_eq!(config.trading.symbols, vec!["BTCUSDT"]);
        assert_eq!(config.trading.trading_hours_start, 8);
    }

    #[test]
    fn test_validate_rejects_bad_timeframe() {
        let mut config = Config::default();
        config.trading.timeframe = "7m".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_rsi_thresholds() {
        let mut config = Config::default();
        config.strategy.rsi_oversold = 75.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_symbols() {
        let mut config = Config::default();
        config.trading.symbols.clear();
        assert!(config.validate().is_err());
    }
}
