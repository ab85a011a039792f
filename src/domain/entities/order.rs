use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order types the Exchange Adapter's `CreateOrder` accepts (spec §4.1).
/// `StopMarket`/`TakeProfitMarket` are the bracket-order types submitted
/// alongside an entry, both with `reduce_only=true`.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        };
        write!(f, "{s}")
    }
}

/// Extra params a bracket order carries beyond price/quantity.
#[derive(Debug, Clone, Default)]
pub struct OrderParams {
    pub stop_price: Option<f64>,
    pub reduce_only: bool,
    /// Caller-chosen idempotency key (Binance's `newClientOrderId`), so a
    /// retried submit after a dropped response doesn't risk a duplicate fill.
    pub client_order_id: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub params: OrderParams,
}

impl Order {
    #[allow(dead_code)]
    pub fn new(
        id: String,
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        price: Option<f64>,
        quantity: f64,
    ) -> Result<Self, String> {
        Self::with_params(id, symbol, side, order_type, price, quantity, OrderParams::default())
    }

    #[allow(dead_code, clippy::too_many_arguments)]
    pub fn with_params(
        id: String,
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        price: Option<f64>,
        quantity: f64,
        params: OrderParams,
    ) -> Result<Self, String> {
        let price = if let Some(p) = price {
            Some(Price::new(p)?)
        } else {
            None
        };
        let quantity = Quantity::new(quantity)?;

        // Validation: limit orders must have price
        if matches!(order_type, OrderType::Limit) && price.is_none() {
            return Err("Limit orders must have a price".to_string());
        }
        if matches!(order_type, OrderType::StopMarket | OrderType::TakeProfitMarket)
            && params.stop_price.is_none()
        {
            return Err("Stop/take-profit market orders must have a stop price".to_string());
        }

        Ok(Order {
            id,
            symbol,
            side,
            order_type,
            price,
            quantity,
            params,
        })
    }

    #[allow(dead_code)]
    pub fn total_value(&self) -> Option<Price> {
        self.price.and_then(|p| p.multiply(self.quantity.value()).ok())
    }
}
