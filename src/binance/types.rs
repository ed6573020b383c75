//! Binance API payload types

use serde::{Deserialize, Serialize};

/// Kline/candlestick data.
///
/// The API returns an array per candle: [open_time, open, high, low, close,
/// volume, close_time, quote_volume, trades, taker_buy_base,
/// taker_buy_quote, ignore]; prices and volumes arrive as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl Kline {
    /// Parse from the raw JSON array returned by the API
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }

        Some(Kline {
            open_time: raw[0].as_i64()?,
            open: raw[1].as_str()?.parse().ok()?,
            high: raw[2].as_str()?.parse().ok()?,
            low: raw[3].as_str()?.parse().ok()?,
            close: raw[4].as_str()?.parse().ok()?,
            volume: raw[5].as_str()?.parse().ok()?,
            close_time: raw[6].as_i64()?,
        })
    }
}

/// Valid Binance kline intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

pub fn is_valid_interval(interval: &str) -> bool {
    BINANCE_INTERVALS.contains(&interval)
}

/// One asset balance within the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl Balance {
    pub fn free_qty(&self) -> f64 {
        self.free.parse().unwrap_or(0.0)
    }

    pub fn locked_qty(&self) -> f64 {
        self.locked.parse().unwrap_or(0.0)
    }
}

/// Response of GET /api/v3/account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub can_trade: bool,
    pub balances: Vec<Balance>,
}

impl AccountInfo {
    /// Balances with a non-zero free or locked amount
    pub fn non_zero_balances(&self) -> Vec<&Balance> {
        self.balances
            .iter()
            .filter(|b| b.free_qty() > 0.0 || b.locked_qty() > 0.0)
            .collect()
    }
}

/// Order side for the order endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of POST /api/v3/order
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub executed_qty: String,
    #[serde(default)]
    pub cummulative_quote_qty: String,
}

impl OrderResponse {
    pub fn executed_quantity(&self) -> f64 {
        self.executed_qty.parse().unwrap_or(0.0)
    }

    /// Total quote currency spent/received, as reported by the exchange
    pub fn quote_total(&self) -> f64 {
        self.cummulative_quote_qty.parse().unwrap_or(0.0)
    }

    /// Average fill price, when the fill quantity is known
    pub fn average_price(&self) -> Option<f64> {
        let qty = self.executed_quantity();
        if qty > 0.0 {
            Some(self.quote_total() / qty)
        } else {
            None
        }
    }
}

/// One open order from GET /api/v3/openOrders
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: i64,
    pub side: String,
    #[serde(default)]
    pub orig_qty: String,
    #[serde(default)]
    pub status: String,
}

/// Error body returned by the API on rejected requests
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kline_from_raw() {
        let raw: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1672531200000, "16500.10", "16600.00", "16450.00", "16580.50",
                "1234.56789", 1672531499999, "20400000.0", 4321,
                "600.0", "9900000.0", "0"]"#,
        )
        .unwrap();

        let kline = Kline::from_raw(&raw).unwrap();
        assert_eq!(kline.open_time, 1672531200000);
        assert_relative_eq!(kline.open, 16500.10);
        assert_relative_eq!(kline.close, 16580.50);
        assert_relative_eq!(kline.volume, 1234.56789);
        assert_eq!(kline.close_time, 1672531499999);
    }

    #[test]
    fn test_kline_from_raw_rejects_short_rows() {
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(r#"[1672531200000, "1.0", "1.0"]"#).unwrap();
        assert!(Kline::from_raw(&raw).is_none());
    }

    #[test]
    fn test_kline_from_raw_rejects_bad_numbers() {
        let raw: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1672531200000, "not-a-price", "1", "1", "1", "1", 1672531499999]"#,
        )
        .unwrap();
        assert!(Kline::from_raw(&raw).is_none());
    }

    #[test]
    fn test_valid_intervals() {
        assert!(is_valid_interval("5m"));
        assert!(is_valid_interval("1h"));
        assert!(!is_valid_interval("2d"));
    }

    #[test]
    fn test_account_non_zero_balances() {
        let account: AccountInfo = serde_json::from_str(
            r#"{"canTrade": true, "balances": [
                {"asset": "BTC", "free": "0.5", "locked": "0.0"},
                {"asset": "DUST", "free": "0.0", "locked": "0.0"},
                {"asset": "USDT", "free": "0.0", "locked": "12.5"}
            ]}"#,
        )
        .unwrap();

        let non_zero = account.non_zero_balances();
        assert_eq!(non_zero.len(), 2);
        assert_eq!(non_zero[0].asset, "BTC");
        assert_eq!(non_zero[1].asset, "USDT");
    }

    #[test]
    fn test_order_response_average_price() {
        let resp: OrderResponse = serde_json::from_str(
            r#"{"symbol": "BTCUSDT", "orderId": 42, "status": "FILLED",
                "executedQty": "0.002", "cummulativeQuoteQty": "33.0"}"#,
        )
        .unwrap();

        assert_relative_eq!(resp.average_price().unwrap(), 16500.0);
    }

    #[test]
    fn test_order_response_no_fill_has_no_price() {
        let resp: OrderResponse = serde_json::from_str(
            r#"{"symbol": "BTCUSDT", "orderId": 42, "status": "NEW",
                "executedQty": "0.0", "cummulativeQuoteQty": "0.0"}"#,
        )
        .unwrap();
        assert!(resp.average_price().is_none());
    }
}
