//! Binance spot API client
//!
//! Public market-data endpoints need no credentials; signed endpoints carry
//! an HMAC-SHA256 signature plus a timestamp and `recvWindow`. Timestamps
//! come from the shared [`TimeSync`] service, and every call runs inside
//! the retry-with-resync wrapper so a clock-skew rejection triggers a
//! forced resync instead of bubbling up to the trading loop.
//!
//! # Example
//!
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

use std::time::Duration;

use reqwest::Method;
use tracing::debug;

use super::auth::{sign_query, Credentials};
use super::error::{BinanceError, BinanceResult};
use super::types::{AccountInfo, ApiErrorBody, Kline, OpenOrder, OrderResponse, OrderSide};
use crate::common::{with_resync, RequestPacer, RetryPolicy};
use crate::time_sync::{BinanceTimeSource, TimeSync, BINANCE_API_BASE, BINANCE_TESTNET_API_BASE};

/// Maximum klines per request (exchange limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Route requests to the spot testnet instead of production
    pub testnet: bool,
    /// Tolerance, in ms, the server allows between request timestamp and
    /// its own clock
    pub recv_window_ms: u64,
    /// Retry behavior for every call
    pub retry: RetryPolicy,
    /// Per-request timeout
    pub timeout: Duration,
    /// Minimum gap between consecutive requests
    pub min_request_gap: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            testnet: false,
            recv_window_ms: 120_000,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            min_request_gap: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    pub fn with_recv_window_ms(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_request_gap(mut self, min_request_gap: Duration) -> Self {
        self.min_request_gap = min_request_gap;
        self
    }
}

/// Binance spot API client
#[derive(Clone)]
pub struct BinanceClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    base_url: String,
    recv_window_ms: u64,
    retry: RetryPolicy,
    pacer: RequestPacer,
    clock: TimeSync<BinanceTimeSource>,
}

impl BinanceClient {
    /// Create a client. Pass `None` credentials for market-data-only use;
    /// signed endpoints then fail with
    /// [`BinanceError::MissingCredentials`].
    pub fn new(
        config: ClientConfig,
        credentials: Option<Credentials>,
        clock: TimeSync<BinanceTimeSource>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        let base_url = if config.testnet {
            BINANCE_TESTNET_API_BASE.to_string()
        } else {
            BINANCE_API_BASE.to_string()
        };

        BinanceClient {
            http,
            credentials,
            base_url,
            recv_window_ms: config.recv_window_ms,
            retry: config.retry,
            pacer: RequestPacer::new(config.min_request_gap),
            clock,
        }
    }

    /// The shared clock service this client stamps requests with
    pub fn clock(&self) -> &TimeSync<BinanceTimeSource> {
        &self.clock
    }

    // ==================== PUBLIC ENDPOINTS ====================

    /// Check connectivity to the REST API
    pub async fn ping(&self) -> BinanceResult<bool> {
        self.pacer.acquire().await;
        let url = format!("{}/api/v3/ping", self.base_url);
        let response = self.http.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Fetch klines (candlestick data), most recent last
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> BinanceResult<Vec<Kline>> {
        let limit = limit.min(MAX_KLINES_PER_REQUEST);

        with_resync(&self.retry, &self.clock, false, |_ts| {
            self.public_get_klines(symbol, interval, limit)
        })
        .await
    }

    async fn public_get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> BinanceResult<Vec<Kline>> {
        self.pacer.acquire().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        debug!(symbol, interval, limit, "Fetching klines");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        let raw: Vec<Vec<serde_json::Value>> = decode_response(response).await?;
        Ok(raw.iter().filter_map(|row| Kline::from_raw(row)).collect())
    }

    // ==================== SIGNED ENDPOINTS ====================

    /// Fetch account information and balances
    pub async fn get_account(&self) -> BinanceResult<AccountInfo> {
        with_resync(&self.retry, &self.clock, false, |ts| {
            self.signed_call(Method::GET, "/api/v3/account", Vec::new(), ts)
        })
        .await
    }

    /// List open orders for a symbol
    pub async fn get_open_orders(&self, symbol: &str) -> BinanceResult<Vec<OpenOrder>> {
        with_resync(&self.retry, &self.clock, false, |ts| {
            let params = vec![("symbol".to_string(), symbol.to_string())];
            self.signed_call(Method::GET, "/api/v3/openOrders", params, ts)
        })
        .await
    }

    /// Place a market order for `quantity` of the base asset.
    ///
    /// Order placement is a critical operation: the clock is force-synced
    /// before the first attempt, trading latency for a timestamp the server
    /// will accept.
    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> BinanceResult<OrderResponse> {
        with_resync(&self.retry, &self.clock, true, |ts| {
            let params = vec![
                ("symbol".to_string(), symbol.to_string()),
                ("side".to_string(), side.as_str().to_string()),
                ("type".to_string(), "MARKET".to_string()),
                ("quantity".to_string(), format_quantity(quantity)),
            ];
            self.signed_call(Method::POST, "/api/v3/order", params, ts)
        })
        .await
    }

    /// Perform one signed request with the given adjusted timestamp
    async fn signed_call<R>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(String, String)>,
        timestamp_ms: i64,
    ) -> BinanceResult<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(BinanceError::MissingCredentials)?;

        self.pacer.acquire().await;

        params.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        params.push(("timestamp".to_string(), timestamp_ms.to_string()));

        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign_query(&query, credentials.api_secret());
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        );

        debug!(
            %method,
            path,
            timestamp_ms,
            offset_ms = self.clock.offset_ms(),
            "Signed request"
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", credentials.api_key())
            .send()
            .await?;

        decode_response(response).await
    }
}

/// Decode a response body, mapping rejected requests to
/// [`BinanceError::Api`] when the body carries an exchange error code.
async fn decode_response<R>(response: reqwest::Response) -> BinanceResult<R>
where
    R: serde::de::DeserializeOwned,
{
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
            return Err(BinanceError::Api {
                code: err.code,
                msg: err.msg,
            });
        }
        return Err(BinanceError::Http { status, body });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Format an order quantity without scientific notation or trailing zeros
fn format_quantity(quantity: f64) -> String {
    let mut s = format!("{:.8}", quantity);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(0.002), "0.002");
        assert_eq!(format_quantity(1.0), "1");
        assert_eq!(format_quantity(0.00012345), "0.00012345");
        assert_eq!(format_quantity(150.5), "150.5");
    }

    #[test]
    fn test_base_url_selection() {
        let clock = TimeSync::new(BinanceTimeSource::new(true), Duration::from_secs(60));
        let client = BinanceClient::new(
            ClientConfig::default().with_testnet(true),
            None,
            clock.clone(),
        );
        assert!(client.base_url.contains("testnet"));

        let client = BinanceClient::new(ClientConfig::default(), None, clock);
        assert_eq!(client.base_url, BINANCE_API_BASE);
    }

    #[tokio::test]
    async fn test_signed_call_without_credentials_fails_fast() {
        let clock = TimeSync::new(BinanceTimeSource::new(true), Duration::from_secs(60));
        // keep the clock fresh so the wrapper does not reach for the network
        clock.update_offset(crate::time_sync::local_time_ms());

        let client = BinanceClient::new(ClientConfig::default().with_testnet(true), None, clock);
        let err = client.get_account().await.unwrap_err();
        assert!(matches!(err, BinanceError::MissingCredentials));
    }
}
