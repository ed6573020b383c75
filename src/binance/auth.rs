//! Authentication utilities for the Binance API
//!
//! Signed endpoints require an HMAC-SHA256 signature over the request's
//! query string, using the API secret as the key, appended as the
//! `signature` parameter.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Generate the HMAC-SHA256 signature for a signed request.
///
/// `payload` is the full query string (including `recvWindow` and
/// `timestamp`), exactly as it will be sent.
pub fn sign_query(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// API credentials container
#[derive(Debug, Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Credentials {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load credentials from `BINANCE_API_KEY` / `BINANCE_API_SECRET`.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("BINANCE_API_KEY")?;
        let api_secret = std::env::var("BINANCE_API_SECRET")?;
        Ok(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}
