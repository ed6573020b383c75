//! Binance-specific error types and retry classification

use reqwest::StatusCode;
use thiserror::Error;

use crate::common::retry::{FailureKind, Retryable};

/// Binance error code: timestamp outside the server's recvWindow
pub const CODE_TIMESTAMP_OUT_OF_WINDOW: i64 = -1021;
/// Binance error code: recvWindow rejected (too large)
pub const CODE_BAD_RECV_WINDOW: i64 = -1131;
/// Binance error code: internal server error
pub const CODE_INTERNAL_ERROR: i64 = -1001;
/// Binance error code: request rate limit exceeded
pub const CODE_TOO_MANY_REQUESTS: i64 = -1003;
/// Binance error code: request timed out server-side
pub const CODE_SERVER_TIMEOUT: i64 = -1007;

#[derive(Debug, Error)]
pub enum BinanceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("Binance API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("API credentials not configured (set BINANCE_API_KEY / BINANCE_API_SECRET)")]
    MissingCredentials,
}

pub type BinanceResult<T> = Result<T, BinanceError>;

impl Retryable for BinanceError {
    /// Map an error onto the retry loop's taxonomy.
    ///
    /// Timestamp/recvWindow rejections get a forced resync before retrying;
    /// network trouble and 5xx get a plain backoff; signature, permission,
    /// balance, and parameter errors are never retried, so bad credentials
    /// are not mistaken for clock drift.
    fn failure_kind(&self) -> FailureKind {
        match self {
            BinanceError::Network(_) => FailureKind::Transient,
            BinanceError::Http { status, .. } if status.is_server_error() => {
                FailureKind::Transient
            }
            BinanceError::Http { .. } => FailureKind::Fatal,
            BinanceError::Api { code, .. } => match *code {
                CODE_TIMESTAMP_OUT_OF_WINDOW | CODE_BAD_RECV_WINDOW => FailureKind::ClockSkew,
                CODE_INTERNAL_ERROR | CODE_TOO_MANY_REQUESTS | CODE_SERVER_TIMEOUT => {
                    FailureKind::Transient
                }
                _ => FailureKind::Fatal,
            },
            BinanceError::Parse(_) | BinanceError::MissingCredentials => FailureKind::Fatal,
        }
    }
}
