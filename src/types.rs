//! Core domain types shared across the bot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading signal derived from the indicator rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position tracked by the bot and persisted for crash recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Database row id, set once persisted
    pub id: Option<i64>,
    pub symbol: String,
    pub side: String,
    pub amount: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub status: String,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.amount
    }
}

/// A completed (or simulated) trade for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: String,
    pub amount: f64,
    pub price: f64,
    pub total: f64,
    pub pnl: f64,
    pub status: String,
    pub strategy_signal: String,
    pub rsi_value: f64,
    pub macd_value: f64,
    pub notes: String,
}
