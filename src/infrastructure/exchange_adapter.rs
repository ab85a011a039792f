//! Binance USD-M futures adapter (spec §4.1).
//!
//! Grounded on `coinbase_client.rs`'s shape — a `Config` with a prod/sandbox
//! base URL, an HMAC signing helper, serde wire DTOs and a `reqwest::Client`
//! carrying a `User-Agent` header — generalized to Binance's actual signing
//! scheme (hex HMAC-SHA256 over the query string, not base64) and REST
//! surface. `FetchPrice` and `LoadMarkets` are the two calls the original
//! retries on transient failure; everything else propagates the first error,
//! since a stale fill report is worse than a missing one.

use crate::domain::entities::bar::Bar;
use crate::domain::entities::order::{Order, OrderParams, OrderSide, OrderType};
use crate::domain::repositories::exchange_client::{
    ExchangeClient, ExchangeError, ExchangeResult, ExchangePosition, OrderReceipt, OrderStatus,
    Ticker24h,
};
use crate::domain::value_objects::symbol;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const BINANCE_FUTURES_BASE: &str = "https://fapi.binance.com";
const BINANCE_FUTURES_TESTNET_BASE: &str = "https://testnet.binancefuture.com";
const RECV_WINDOW_MS: u64 = 5_000;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct BinanceFuturesConfig {
    pub api_base: String,
    pub api_key: String,
    pub api_secret: String,
}

impl BinanceFuturesConfig {
    pub fn new(api_key: &str, api_secret: &str, testnet: bool) -> Self {
        Self {
            api_base: if testnet {
                BINANCE_FUTURES_TESTNET_BASE.to_string()
            } else {
                BINANCE_FUTURES_BASE.to_string()
            },
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SymbolPrecision {
    amount_decimals: u32,
    price_decimals: u32,
}

impl Default for SymbolPrecision {
    fn default() -> Self {
        // Reasonable fallback for a symbol `load_markets` hasn't cached yet.
        Self { amount_decimals: 3, price_decimals: 2 }
    }
}

pub struct BinanceFuturesClient {
    client: Client,
    config: BinanceFuturesConfig,
    precision: Mutex<HashMap<String, SymbolPrecision>>,
}

impl BinanceFuturesClient {
    pub fn new(config: BinanceFuturesConfig) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .timeout(Duration::from_secs(25))
            .user_agent("gemini-trading-agent/0.1.0")
            .build()
            .expect("failed to build the futures HTTP client");

        Self { client, config, precision: Mutex::new(HashMap::new()) }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before the epoch")
            .as_millis()
    }

    /// GET a public (unsigned) endpoint.
    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> ExchangeResult<Value> {
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let url = if query.is_empty() {
            format!("{}{}", self.config.api_base, path)
        } else {
            format!("{}{}?{}", self.config.api_base, path, query)
        };
        self.send(Method::GET, &url).await
    }

    /// Send a signed request; `params` excludes `timestamp`/`recvWindow`/`signature`.
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> ExchangeResult<Value> {
        params.push(("timestamp".to_string(), Self::timestamp_ms().to_string()));
        params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.config.api_base, path, query, signature);
        self.send(method, &url).await
    }

    async fn send(&self, method: Method, url: &str) -> ExchangeResult<Value> {
        let mut request = self.client.request(method, url);
        if !self.config.api_key.is_empty() {
            request = request.header("X-MBX-APIKEY", &self.config.api_key);
        }

        let response = request.send().await.map_err(|e| ExchangeError::Network(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ExchangeError::Network(format!("invalid response body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }
        Err(Self::classify_error(status.as_u16(), &body))
    }

    fn classify_error(status: u16, body: &Value) -> ExchangeError {
        let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
        let msg = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        match (status, code) {
            (401, _) | (_, -2015) => ExchangeError::Auth(msg),
            (_, -1121) => ExchangeError::BadSymbol(msg),
            (429, _) | (418, _) => ExchangeError::RateLimit { retry_after_ms: 1_000 },
            (_, -2019) | (_, -2010) => ExchangeError::OrderPlacementFailed(msg),
            _ if status >= 500 => ExchangeError::Network(format!("{status}: {msg}")),
            _ => ExchangeError::Network(msg),
        }
    }

    /// Retry wrapper for the two calls the spec singles out (`FetchPrice`,
    /// `LoadMarkets`): transient errors get exponential backoff up to
    /// `MAX_RETRIES` attempts, anything else fails fast.
    async fn with_retry<T, F, Fut>(&self, op: &str, f: F) -> ExchangeResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ExchangeResult<T>>,
    {
        let mut delay = Duration::from_millis(500);
        let mut last_err = None;
        for attempt in 1..=MAX_RETRIES {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    warn!(op, attempt, error = %e, "retrying after transient exchange error");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("loop only exits via return or a recorded error"))
    }

    /// Populate the lot-size/tick-size cache from `/fapi/v1/exchangeInfo`.
    /// Called once at startup; wrapped in the same retry policy as
    /// `fetch_price` since both are needed before the bot can trade at all.
    pub async fn load_markets(&self) -> ExchangeResult<()> {
        let body = self
            .with_retry("load_markets", || self.public_get("/fapi/v1/exchangeInfo", &[]))
            .await?;

        let symbols = body
            .get("symbols")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut cache = self.precision.lock().expect("precision cache mutex poisoned");
        for entry in symbols {
            let Some(wire_symbol) = entry.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let amount_decimals = entry
                .get("quantityPrecision")
                .and_then(Value::as_u64)
                .unwrap_or(3) as u32;
            let price_decimals = entry
                .get("pricePrecision")
                .and_then(Value::as_u64)
                .unwrap_or(2) as u32;
            cache.insert(
                wire_symbol.to_string(),
                SymbolPrecision { amount_decimals, price_decimals },
            );
        }
        Ok(())
    }

    fn precision_for(&self, symbol: &str) -> SymbolPrecision {
        let wire = symbol::to_binance_futures(symbol);
        self.precision
            .lock()
            .expect("precision cache mutex poisoned")
            .get(&wire)
            .copied()
            .unwrap_or_default()
    }

    fn round_to(value: f64, decimals: u32) -> f64 {
        let factor = 10f64.powi(decimals as i32);
        (value * factor).floor() / factor
    }

    fn order_status_from_wire(status: &str) -> OrderStatus {
        match status {
            "NEW" => OrderStatus::Pending,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" | "EXPIRED_IN_MATCH" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown,
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    fn name(&self) -> &str {
        "Binance Futures"
    }

    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<f64> {
        let wire = symbol::to_binance_futures(symbol);
        self.with_retry("fetch_price", || async {
            let body = self
                .public_get("/fapi/v1/ticker/price", &[("symbol", wire.clone())])
                .await?;
            body.get("price")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| ExchangeError::BadSymbol(symbol.to_string()))
        })
        .await
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Bar>> {
        let wire = symbol::to_binance_futures(symbol);
        let body = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", wire),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let rows = body
            .as_array()
            .ok_or_else(|| ExchangeError::Network("klines response was not an array".into()))?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let cells = row
                .as_array()
                .ok_or_else(|| ExchangeError::Network("malformed kline row".into()))?;
            let get_f64 = |i: usize| -> ExchangeResult<f64> {
                cells
                    .get(i)
                    .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
                    .ok_or_else(|| ExchangeError::Network("malformed kline field".into()))
            };
            let ts_ms = cells
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| ExchangeError::Network("malformed kline timestamp".into()))?;

            let bar = Bar::new(ts_ms, get_f64(1)?, get_f64(2)?, get_f64(3)?, get_f64(4)?, get_f64(5)?)
                .map_err(ExchangeError::Network)?;
            bars.push(bar);
        }
        Ok(bars)
    }

    async fn fetch_balance(&self, quote: &str) -> ExchangeResult<f64> {
        let body = self.signed_request(Method::GET, "/fapi/v2/balance", vec![]).await?;
        let entries = body
            .as_array()
            .ok_or_else(|| ExchangeError::Network("balance response was not an array".into()))?;

        let balance = entries
            .iter()
            .find(|e| e.get("asset").and_then(Value::as_str) == Some(quote))
            .and_then(|e| e.get("balance"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(balance)
    }

    async fn fetch_open_positions(&self) -> ExchangeResult<Vec<ExchangePosition>> {
        let body = self.signed_request(Method::GET, "/fapi/v2/positionRisk", vec![]).await?;
        let entries = body
            .as_array()
            .ok_or_else(|| ExchangeError::Network("positionRisk response was not an array".into()))?;

        let positions = entries
            .iter()
            .filter_map(|e| {
                let wire_symbol = e.get("symbol")?.as_str()?;
                let amount: f64 = e.get("positionAmt")?.as_str()?.parse().ok()?;
                if amount == 0.0 {
                    return None;
                }
                let entry_price: f64 = e.get("entryPrice")?.as_str()?.parse().unwrap_or(0.0);
                Some(ExchangePosition {
                    symbol: symbol::canonicalize(wire_symbol),
                    side: if amount > 0.0 { OrderSide::Buy } else { OrderSide::Sell },
                    contracts: amount.abs(),
                    entry_price,
                })
            })
            .collect();
        Ok(positions)
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Order>> {
        let mut params = Vec::new();
        if let Some(s) = symbol {
            params.push(("symbol".to_string(), symbol::to_binance_futures(s)));
        }
        let body = self.signed_request(Method::GET, "/fapi/v1/openOrders", params).await?;
        let entries = body
            .as_array()
            .ok_or_else(|| ExchangeError::Network("openOrders response was not an array".into()))?;

        let mut orders = Vec::with_capacity(entries.len());
        for e in entries {
            let id = e.get("orderId").map(|v| v.to_string()).unwrap_or_default();
            let wire_symbol = e.get("symbol").and_then(Value::as_str).unwrap_or_default();
            let side = match e.get("side").and_then(Value::as_str) {
                Some("SELL") => OrderSide::Sell,
                _ => OrderSide::Buy,
            };
            let order_type = match e.get("type").and_then(Value::as_str) {
                Some("LIMIT") => OrderType::Limit,
                Some("STOP_MARKET") => OrderType::StopMarket,
                Some("TAKE_PROFIT_MARKET") => OrderType::TakeProfitMarket,
                _ => OrderType::Market,
            };
            let price = e
                .get("price")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|p| *p > 0.0);
            let quantity: f64 = e
                .get("origQty")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            let stop_price = e
                .get("stopPrice")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|p| *p > 0.0);
            let reduce_only = e.get("reduceOnly").and_then(Value::as_bool).unwrap_or(false);

            let order = Order::with_params(
                id,
                symbol::canonicalize(wire_symbol),
                side,
                order_type,
                price,
                quantity,
                OrderParams { stop_price, reduce_only, client_order_id: None },
            )
            .map_err(ExchangeError::OrderPlacementFailed)?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn fetch_tickers_24h(&self) -> ExchangeResult<Vec<Ticker24h>> {
        let body = self.public_get("/fapi/v1/ticker/24hr", &[]).await?;
        let entries = body
            .as_array()
            .ok_or_else(|| ExchangeError::Network("24hr ticker response was not an array".into()))?;

        let tickers = entries
            .iter()
            .filter_map(|e| {
                let wire_symbol = e.get("symbol")?.as_str()?;
                let quote_volume = e.get("quoteVolume")?.as_str()?.parse().ok()?;
                let price_change_percent = e.get("priceChangePercent")?.as_str()?.parse().ok()?;
                Some(Ticker24h {
                    symbol: symbol::canonicalize(wire_symbol),
                    quote_volume,
                    price_change_percent,
                })
            })
            .collect();
        Ok(tickers)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let wire = symbol::to_binance_futures(symbol);
        self.signed_request(
            Method::POST,
            "/fapi/v1/leverage",
            vec![("symbol".to_string(), wire), ("leverage".to_string(), leverage.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: f64,
        price: Option<f64>,
        params: OrderParams,
    ) -> ExchangeResult<OrderReceipt> {
        let wire = symbol::to_binance_futures(symbol);
        let mut body_params = vec![
            ("symbol".to_string(), wire),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), self.amount_to_precision(symbol, amount).to_string()),
        ];
        if let Some(p) = price {
            body_params.push(("price".to_string(), self.price_to_precision(symbol, p).to_string()));
            body_params.push(("timeInForce".to_string(), "GTC".to_string()));
        }
        if let Some(stop_price) = params.stop_price {
            body_params
                .push(("stopPrice".to_string(), self.price_to_precision(symbol, stop_price).to_string()));
        }
        if params.reduce_only {
            body_params.push(("reduceOnly".to_string(), "true".to_string()));
        }

        let body = self
            .signed_request(Method::POST, "/fapi/v1/order", body_params)
            .await
            .map_err(|e| ExchangeError::OrderPlacementFailed(e.to_string()))?;

        let order_id = body
            .get("orderId")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .map(Self::order_status_from_wire)
            .unwrap_or(OrderStatus::Unknown);
        let average_price = body
            .get("avgPrice")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|p| *p > 0.0);

        Ok(OrderReceipt { order_id, status, average_price })
    }

    async fn cancel_order(&self, id: &str, symbol: &str) -> ExchangeResult<()> {
        let wire = symbol::to_binance_futures(symbol);
        self.signed_request(
            Method::DELETE,
            "/fapi/v1/order",
            vec![("symbol".to_string(), wire), ("orderId".to_string(), id.to_string())],
        )
        .await
        .map_err(|e| ExchangeError::OrderCancellationFailed(e.to_string()))?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let wire = symbol::to_binance_futures(symbol);
        self.signed_request(Method::DELETE, "/fapi/v1/allOpenOrders", vec![("symbol".to_string(), wire)])
            .await
            .map_err(|e| ExchangeError::OrderCancellationFailed(e.to_string()))?;
        Ok(())
    }

    fn amount_to_precision(&self, symbol: &str, amount: f64) -> f64 {
        Self::round_to(amount, self.precision_for(symbol).amount_decimals)
    }

    fn price_to_precision(&self, symbol: &str, price: f64) -> f64 {
        Self::round_to(price, self.precision_for(symbol).price_decimals)
    }

    async fn is_healthy(&self) -> bool {
        self.public_get("/fapi/v1/ping", &[]).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_selects_testnet_base() {
        let config = BinanceFuturesConfig::new("key", "secret", true);
        assert_eq!(config.api_base, BINANCE_FUTURES_TESTNET_BASE);
    }

    #[test]
    fn config_selects_production_base() {
        let config = BinanceFuturesConfig::new("key", "secret", false);
        assert_eq!(config.api_base, BINANCE_FUTURES_BASE);
    }

    #[test]
    fn rounds_amount_down_to_precision() {
        assert_eq!(BinanceFuturesClient::round_to(1.23456, 3), 1.234);
        assert_eq!(BinanceFuturesClient::round_to(0.1, 0), 0.0);
    }

    #[test]
    fn classifies_rate_limit_and_bad_symbol() {
        let rate_limited = BinanceFuturesClient::classify_error(429, &serde_json::json!({}));
        assert!(rate_limited.is_transient());

        let bad_symbol =
            BinanceFuturesClient::classify_error(400, &serde_json::json!({"code": -1121, "msg": "bad"}));
        assert!(matches!(bad_symbol, ExchangeError::BadSymbol(_)));
    }

    #[test]
    fn order_status_maps_known_wire_values() {
        assert_eq!(BinanceFuturesClient::order_status_from_wire("FILLED"), OrderStatus::Filled);
        assert_eq!(BinanceFuturesClient::order_status_from_wire("NEW"), OrderStatus::Pending);
        assert_eq!(BinanceFuturesClient::order_status_from_wire("??"), OrderStatus::Unknown);
    }
}
