//! Process-wide state container (SPEC_FULL.md §A, REDESIGN FLAGS §9).
//!
//! `Core` owns everything `trader`/`position_manager`/`scanner`/`scheduler`
//! need to act: the venue/LLM/notifier trait objects, the database pool, the
//! two TTL caches (spec §4.3), the live-reloadable `Settings`, and the
//! semaphore bounding the Scanner's concurrent analysis fan-out.

use crate::config::Settings;
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::repositories::llm_client::LlmClient;
use crate::domain::repositories::notifier::Notifier;
use crate::domain::services::cache::TtlCache;
use crate::persistence::DbPool;
use crate::trading::scanner::{NewsSource, SentimentSource};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;

/// The Scanner's analysis fan-out is bounded at 10 concurrent LLM calls
/// regardless of how many candidates survive the pre-filter (spec §5).
pub const SCAN_CONCURRENCY: usize = 10;

pub struct Core {
    pub settings: RwLock<Settings>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub llm: Arc<dyn LlmClient>,
    pub notifier: Arc<dyn Notifier>,
    pub db: DbPool,
    pub price_cache: TtlCache<f64>,
    pub indicators_cache: TtlCache<HashMap<String, f64>>,
    pub scan_semaphore: Semaphore,
    /// Holistic analysis collaborators (SPEC_FULL.md §C): absent unless a
    /// caller opts in via `with_holistic_sources`, in which case the Scanner
    /// prefers the news+sentiment prompt shape over single/MTA technicals.
    pub news_source: Option<Arc<dyn NewsSource>>,
    pub sentiment_source: Option<Arc<dyn SentimentSource>>,
}

impl Core {
    pub fn new(
        settings: Settings,
        exchange: Arc<dyn ExchangeClient>,
        llm: Arc<dyn LlmClient>,
        notifier: Arc<dyn Notifier>,
        db: DbPool,
    ) -> Self {
        Core {
            settings: RwLock::new(settings),
            exchange,
            llm,
            notifier,
            db,
            price_cache: TtlCache::new(),
            indicators_cache: TtlCache::new(),
            scan_semaphore: Semaphore::new(SCAN_CONCURRENCY),
            news_source: None,
            sentiment_source: None,
        }
    }

    /// Opt into holistic (news + sentiment) analysis prompts. Both sources
    /// must be supplied together; the Scanner only switches prompt shape
    /// when it has both a headline feed and a sentiment score to embed.
    pub fn with_holistic_sources(
        mut self,
        news_source: Arc<dyn NewsSource>,
        sentiment_source: Arc<dyn SentimentSource>,
    ) -> Self {
        self.news_source = Some(news_source);
        self.sentiment_source = Some(sentiment_source);
        self
    }

    /// A cheap clone of the current settings, for callers that need to read
    /// several fields without holding the lock across an `.await`.
    pub fn settings_snapshot(&self) -> Settings {
        self.settings.read().expect("settings lock poisoned").clone()
    }

    /// Replace the whole settings snapshot, e.g. after `Scheduler::Reschedule`
    /// applies a batch of key changes (spec §4.8).
    pub fn replace_settings(&self, settings: Settings) {
        *self.settings.write().expect("settings lock poisoned") = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::notifier::NullNotifier;
    use crate::infrastructure::llm_client::{GeminiClient, GeminiConfig};
    use async_trait::async_trait;
    use crate::domain::entities::bar::Bar;
    use crate::domain::entities::order::{Order, OrderParams, OrderSide, OrderType};
    use crate::domain::repositories::exchange_client::{
        ExchangeClient, ExchangeResult, ExchangePosition, OrderReceipt, Ticker24h,
    };

    struct StubExchange;

    #[async_trait]
    impl ExchangeClient for StubExchange {
        fn name(&self) -> &str {
            "stub"
        }
        async fn fetch_price(&self, _symbol: &str) -> ExchangeResult<f64> {
            Ok(100.0)
        }
        async fn fetch_ohlcv(
            &self,
            _symbol: &str,
            _timeframe: &str,
            _limit: usize,
        ) -> ExchangeResult<Vec<Bar>> {
            Ok(Vec::new())
        }
        async fn fetch_balance(&self, _quote: &str) -> ExchangeResult<f64> {
            Ok(10_000.0)
        }
        async fn fetch_open_positions(&self) -> ExchangeResult<Vec<ExchangePosition>> {
            Ok(Vec::new())
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> ExchangeResult<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn fetch_tickers_24h(&self) -> ExchangeResult<Vec<Ticker24h>> {
            Ok(Vec::new())
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> ExchangeResult<()> {
            Ok(())
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _order_type: OrderType,
            _side: OrderSide,
            _amount: f64,
            _price: Option<f64>,
            _params: OrderParams,
        ) -> ExchangeResult<OrderReceipt> {
            unimplemented!()
        }
        async fn cancel_order(&self, _id: &str, _symbol: &str) -> ExchangeResult<()> {
            Ok(())
        }
        async fn cancel_all_orders(&self, _symbol: &str) -> ExchangeResult<()> {
            Ok(())
        }
        fn amount_to_precision(&self, _symbol: &str, amount: f64) -> f64 {
            amount
        }
        fn price_to_precision(&self, _symbol: &str, price: f64) -> f64 {
            price
        }
    }

    fn test_core(db: DbPool) -> Core {
        Core::new(
            Settings::default(),
            Arc::new(StubExchange),
            Arc::new(GeminiClient::new(GeminiConfig::new("test-key"), vec!["gemini-1.5-flash".to_string()])),
            Arc::new(NullNotifier),
            db,
        )
    }

    #[tokio::test]
    async fn settings_snapshot_reflects_replacement() {
        let db = crate::persistence::init_database("sqlite::memory:").await.unwrap();
        let core = test_core(db);
        assert_eq!(core.settings_snapshot().max_concurrent_trades, 5);

        let mut updated = Settings::default();
        updated.max_concurrent_trades = 9;
        core.replace_settings(updated);
        assert_eq!(core.settings_snapshot().max_concurrent_trades, 9);
    }

    #[tokio::test]
    async fn scan_semaphore_starts_at_full_capacity() {
        let db = crate::persistence::init_database("sqlite::memory:").await.unwrap();
        let core = test_core(db);
        assert_eq!(core.scan_semaphore.available_permits(), SCAN_CONCURRENCY);
    }
}
