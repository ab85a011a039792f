//! Telegram `Notifier` (spec §6). Fire-and-forget HTTP POST to the Bot API;
//! failures are logged and swallowed, matching the trait's contract that a
//! notification is never allowed to fail a trade.

use crate::domain::repositories::notifier::{Notification, Notifier};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(25))
            .build()
            .expect("failed to build the Telegram HTTP client");
        Self { client, bot_token: bot_token.to_string(), chat_id: chat_id.to_string() }
    }

    fn format(notification: &Notification) -> String {
        match notification {
            Notification::PositionOpened { symbol, side, amount, entry_price } => format!(
                "opened {side} {symbol} amount={amount} entry={entry_price}"
            ),
            Notification::PositionClosed { symbol, reason, pnl } => {
                format!("closed {symbol} ({reason}) pnl={pnl:.2}")
            }
            Notification::PartialTakeProfit { symbol, closed_amount } => {
                format!("partial take-profit on {symbol}: closed {closed_amount}")
            }
            Notification::SyncWarning { message } => format!("sync warning: {message}"),
            Notification::OrphanOrderCleaned { symbol, order_id } => {
                format!("cancelled orphan order {order_id} on {symbol}")
            }
        }
    }

    async fn send(&self, text: &str) -> Result<(), String> {
        let url = format!("{TELEGRAM_API_BASE}/bot{}/sendMessage", self.bot_token);
        let body = json!({ "chat_id": self.chat_id, "text": text });

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("telegram returned {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: Notification) {
        let text = Self::format(&notification);
        if let Err(e) = self.send(&text).await {
            warn!(error = %e, "failed to deliver telegram notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_position_opened() {
        let text = TelegramNotifier::format(&Notification::PositionOpened {
            symbol: "BTC/USDT".to_string(),
            side: "buy".to_string(),
            amount: 0.1,
            entry_price: 65000.0,
        });
        assert!(text.contains("BTC/USDT"));
        assert!(text.contains("buy"));
    }

    #[test]
    fn formats_position_closed_with_pnl() {
        let text = TelegramNotifier::format(&Notification::PositionClosed {
            symbol: "ETH/USDT".to_string(),
            reason: "take_profit".to_string(),
            pnl: 42.5,
        });
        assert!(text.contains("42.50"));
        assert!(text.contains("take_profit"));
    }
}
