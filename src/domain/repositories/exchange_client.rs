//! Exchange Adapter trait (spec §4.1)
//!
//! A typed façade over a CCXT-style derivatives exchange. Concrete
//! implementations (see `infrastructure::exchange_adapter`) translate this
//! into venue-specific REST calls; everything above this trait is
//! exchange-agnostic.

use crate::domain::entities::bar::Bar;
use crate::domain::entities::order::{Order, OrderParams, OrderSide, OrderType};
use async_trait::async_trait;
use thiserror::Error;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Error taxonomy for exchange operations (spec §7).
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("unknown or unsupported symbol: {0}")]
    BadSymbol(String),

    #[error("operation not supported by this venue: {0}")]
    NotSupported(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    #[error("order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("order cancellation failed: {0}")]
    OrderCancellationFailed(String),
}

impl ExchangeError {
    /// Transient errors are worth retrying inside the adapter (spec §4.1, §7).
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::RateLimit { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Balance {
    pub currency: String,
    pub available: f64,
    pub total: f64,
}

/// A position as reported by the exchange itself (only entries with nonzero
/// contracts are returned by `fetch_open_positions`).
#[derive(Debug, Clone)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: OrderSide,
    pub contracts: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone)]
pub struct Ticker24h {
    pub symbol: String,
    pub quote_volume: f64,
    pub price_change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
    Unknown,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// The exchange's view of a submitted order — used by the Trader to learn
/// the average fill price (spec §4.5 step 8: "order average; fallback to
/// last trade; fallback to ticker").
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: OrderStatus,
    pub average_price: Option<f64>,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Last trade price for `symbol` (canonical "BASE/QUOTE" form).
    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<f64>;

    /// `limit` most recent bars at `timeframe` ("1m", "15m", "4h", ...).
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize)
        -> ExchangeResult<Vec<Bar>>;

    /// Total equity in `quote` (futures wallet balance).
    async fn fetch_balance(&self, quote: &str) -> ExchangeResult<f64>;

    async fn fetch_open_positions(&self) -> ExchangeResult<Vec<ExchangePosition>>;

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Order>>;

    async fn fetch_tickers_24h(&self) -> ExchangeResult<Vec<Ticker24h>>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    #[allow(clippy::too_many_arguments)]
    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: f64,
        price: Option<f64>,
        params: OrderParams,
    ) -> ExchangeResult<OrderReceipt>;

    async fn cancel_order(&self, id: &str, symbol: &str) -> ExchangeResult<()>;

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()>;

    /// Round `amount` to the exchange's lot-size tick for `symbol`.
    fn amount_to_precision(&self, symbol: &str, amount: f64) -> f64;

    /// Round `price` to the exchange's price tick for `symbol`.
    fn price_to_precision(&self, symbol: &str, price: f64) -> f64;

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_display() {
        assert_eq!(OrderStatus::Filled.to_string(), "FILLED");
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn network_and_rate_limit_are_transient() {
        assert!(ExchangeError::Network("timeout".into()).is_transient());
        assert!(ExchangeError::RateLimit { retry_after_ms: 500 }.is_transient());
        assert!(!ExchangeError::BadSymbol("XYZ".into()).is_transient());
    }
}
