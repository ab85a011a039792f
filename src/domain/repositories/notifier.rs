//! Notifier trait (spec §4, §6) — a fire-and-forget message sink for trade
//! events. Failures are logged and swallowed; a notification is never a
//! reason to fail a trade.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub enum Notification {
    PositionOpened {
        symbol: String,
        side: String,
        amount: f64,
        entry_price: f64,
    },
    PositionClosed {
        symbol: String,
        reason: String,
        pnl: f64,
    },
    PartialTakeProfit {
        symbol: String,
        closed_amount: f64,
    },
    SyncWarning {
        message: String,
    },
    OrphanOrderCleaned {
        symbol: String,
        order_id: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// A notifier that drops every message — used when `TELEGRAM_ENABLED=false`.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _notification: Notification) {}
}
