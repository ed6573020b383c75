//! Telegram notifications
//!
//! Best-effort push messages for trades and errors. A notification failure
//! is logged and swallowed; it must never take the trading loop down.

use serde_json::json;
use tracing::{debug, warn};

use crate::types::TradeRecord;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        TelegramNotifier {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Build a notifier from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`.
    /// Returns `None` when either is missing, which disables notifications.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(Self::new(bot_token, chat_id))
    }

    /// Send an HTML-formatted message. Errors are logged, not returned.
    pub async fn send_message(&self, text: &str) {
        let url = format!(
            "{}/bot{}/sendMessage",
            TELEGRAM_API_BASE, self.bot_token
        );
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Telegram message sent");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Telegram rejected the message");
            }
            Err(err) => {
                warn!(error = %err, "Failed to send Telegram message");
            }
        }
    }

    pub async fn notify_trade(&self, trade: &TradeRecord) {
        let emoji = if trade.side.eq_ignore_ascii_case("buy") {
            "\u{1F7E2}"
        } else {
            "\u{1F534}"
        };
        let text = format!(
            "{emoji} <b>{} {}</b>\nAmount: {:.6}\nPrice: {:.2}\nTotal: {:.2}\nRSI: {:.1} | MACD: {:.4}\n{}",
            trade.side.to_uppercase(),
            trade.symbol,
            trade.amount,
            trade.price,
            trade.total,
            trade.rsi_value,
            trade.macd_value,
            trade.notes,
        );
        self.send_message(&text).await;
    }

    pub async fn notify_error(&self, context: &str, err: &str) {
        let text = format!("\u{26A0} <b>Bot error</b>\n{context}\n<code>{err}</code>");
        self.send_message(&text).await;
    }
}
