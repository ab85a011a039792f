//! Scheduler (spec §4.8): four periodic jobs sharing one `Core`.
//!
//! Each job is its own loop task, so same-job runs can never overlap
//! (`max_instances=1` is structural rather than a lock). `reschedule` is the
//! live-reconfiguration entry point: it starts or stops the scanner job,
//! triggers `LlmClient::reconfigure` when the model fallback list changed,
//! and wakes every sleeping job so an interval change is picked up on the
//! spot instead of after the old interval runs out.

use crate::config::{MarketType, Settings};
use crate::persistence::repository::ManagedPositionRepository;
use crate::trading::core::Core;
use crate::trading::{position_manager, scanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::error;

/// Run one job tick on its own task so a panic inside it is caught at the
/// job boundary (spec §7) instead of killing the scheduling loop.
async fn run_guarded<F>(job_name: &'static str, body: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Err(join_err) = tokio::spawn(body).await {
        error!(job = job_name, error = %join_err, "CRITICAL: scheduler job panicked, schedule continues");
    }
}

/// Sleep for `secs`, but wake early (and let the caller re-read the current
/// interval) if a reschedule fires in the meantime.
async fn sleep_or_reanchor(secs: u64, reanchor: &Notify) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(secs)) => true,
        _ = reanchor.notified() => false,
    }
}

async fn position_sync_loop(core: Arc<Core>, reanchor: Arc<Notify>) {
    loop {
        let interval = core.settings_snapshot().position_sync_interval_seconds;
        if !sleep_or_reanchor(interval, &reanchor).await {
            continue;
        }
        let core = Arc::clone(&core);
        run_guarded("position_sync_job", async move {
            if let Err(e) = position_manager::reconcile(&core).await {
                error!(error = %e, "position_sync_job failed");
            }
        })
        .await;
    }
}

async fn position_checker_loop(core: Arc<Core>, reanchor: Arc<Notify>) {
    loop {
        let interval = core.settings_snapshot().position_check_interval_seconds;
        if !sleep_or_reanchor(interval, &reanchor).await {
            continue;
        }
        let core = Arc::clone(&core);
        run_guarded("position_checker_job", async move {
            let positions = match ManagedPositionRepository::new(core.db.clone()).get_all().await {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "position_checker_job failed to load managed positions");
                    return;
                }
            };
            // Spec §4.6: steps within a single position run sequentially;
            // different positions may be interleaved, but running them one
            // after another here still satisfies that (weaker) guarantee.
            for position in positions {
                if let Err(e) = position_manager::tick_position(&core, &position.symbol).await {
                    error!(symbol = %position.symbol, error = %e, "position_checker_job tick failed");
                }
            }
        })
        .await;
    }
}

async fn orphan_order_loop(core: Arc<Core>, reanchor: Arc<Notify>) {
    loop {
        let interval = core.settings_snapshot().orphan_order_check_interval_seconds;
        if !sleep_or_reanchor(interval, &reanchor).await {
            continue;
        }
        let core = Arc::clone(&core);
        run_guarded("orphan_order_job", async move {
            let settings = core.settings_snapshot();
            if !settings.live_trading || !matches!(settings.default_market_type, MarketType::Future) {
                return;
            }
            if let Err(e) = position_manager::sweep_orphan_orders(&core).await {
                error!(error = %e, "orphan_order_job failed");
            }
        })
        .await;
    }
}

async fn scanner_loop(core: Arc<Core>, reanchor: Arc<Notify>) {
    loop {
        let interval = core.settings_snapshot().proactive_scan_interval_seconds;
        if !sleep_or_reanchor(interval, &reanchor).await {
            continue;
        }
        let core = Arc::clone(&core);
        run_guarded("scanner_job", async move {
            let _summary = scanner::run_scan(&core, &[]).await;
        })
        .await;
    }
}

/// Owns the four job tasks and the `Core` they share.
pub struct Scheduler {
    core: Arc<Core>,
    reanchor: Arc<Notify>,
    position_sync: Mutex<Option<JoinHandle<()>>>,
    position_checker: Mutex<Option<JoinHandle<()>>>,
    orphan_order: Mutex<Option<JoinHandle<()>>>,
    scanner: Mutex<Option<JoinHandle<()>>>,
    scanner_running: AtomicBool,
}

impl Scheduler {
    pub fn new(core: Arc<Core>) -> Self {
        Scheduler {
            core,
            reanchor: Arc::new(Notify::new()),
            position_sync: Mutex::new(None),
            position_checker: Mutex::new(None),
            orphan_order: Mutex::new(None),
            scanner: Mutex::new(None),
            scanner_running: AtomicBool::new(false),
        }
    }

    /// Spawn the three always-on jobs, plus the scanner if it starts enabled.
    pub async fn start(&self) {
        *self.position_sync.lock().await =
            Some(tokio::spawn(position_sync_loop(Arc::clone(&self.core), Arc::clone(&self.reanchor))));
        *self.position_checker.lock().await =
            Some(tokio::spawn(position_checker_loop(Arc::clone(&self.core), Arc::clone(&self.reanchor))));
        *self.orphan_order.lock().await =
            Some(tokio::spawn(orphan_order_loop(Arc::clone(&self.core), Arc::clone(&self.reanchor))));

        if self.core.settings_snapshot().proactive_scan_enabled {
            self.start_scanner().await;
        }
    }

    async fn start_scanner(&self) {
        if self.scanner_running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.scanner.lock().await =
            Some(tokio::spawn(scanner_loop(Arc::clone(&self.core), Arc::clone(&self.reanchor))));
    }

    async fn stop_scanner(&self) {
        if !self.scanner_running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.scanner.lock().await.take() {
            handle.abort();
        }
    }

    /// Apply a settings change (spec §4.8 `Reschedule`): persist the new
    /// snapshot, add/remove the scanner job if its enabled flag flipped,
    /// reconfigure the LLM client if the model fallback list changed, and
    /// wake every job loop so interval changes apply immediately.
    pub async fn reschedule(&self, new_settings: Settings) {
        let previous = self.core.settings_snapshot();
        let model_list_changed = previous.llm_model_list() != new_settings.llm_model_list();
        let scanner_enabled = new_settings.proactive_scan_enabled;

        self.core.replace_settings(new_settings);

        if scanner_enabled {
            self.start_scanner().await;
        } else {
            self.stop_scanner().await;
        }

        if model_list_changed {
            self.core.llm.reconfigure(self.core.settings_snapshot().llm_model_list()).await;
        }

        self.reanchor.notify_waiters();
    }

    /// Abort every running job task. Used at process shutdown.
    pub async fn shutdown(&self) {
        for job in [&self.position_sync, &self.position_checker, &self.orphan_order, &self.scanner] {
            if let Some(handle) = job.lock().await.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::bar::Bar;
    use crate::domain::entities::order::{Order, OrderParams, OrderSide, OrderType};
    use crate::domain::entities::recommendation::Recommendation;
    use crate::domain::repositories::exchange_client::{
        ExchangeClient, ExchangeResult, ExchangePosition, OrderReceipt, Ticker24h,
    };
    use crate::domain::repositories::llm_client::{LlmClient, LlmError, LlmResponse};
    use crate::domain::repositories::notifier::NullNotifier;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubExchange;

    #[async_trait]
    impl ExchangeClient for StubExchange {
        fn name(&self) -> &str {
            "stub"
        }
        async fn fetch_price(&self, _symbol: &str) -> ExchangeResult<f64> {
            Ok(100.0)
        }
        async fn fetch_ohlcv(&self, _symbol: &str, _timeframe: &str, _limit: usize) -> ExchangeResult<Vec<Bar>> {
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

    /// Records every `reconfigure` call so tests can assert on it without a
    /// real LLM endpoint.
    struct RecordingLlm {
        reconfigure_calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn invoke(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                recommendation: Recommendation::Wait,
                reason: String::new(),
                raw: serde_json::json!({}),
            })
        }
        async fn reconfigure(&self, _models: Vec<String>) {
            self.reconfigure_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn test_scheduler(db: crate::persistence::DbPool) -> (Scheduler, Arc<RecordingLlm>) {
        let llm = Arc::new(RecordingLlm { reconfigure_calls: AtomicUsize::new(0) });
        let core = Arc::new(Core::new(
            Settings::default(),
            Arc::new(StubExchange),
            llm.clone() as Arc<dyn LlmClient>,
            Arc::new(NullNotifier),
            db,
        ));
        (Scheduler::new(core), llm)
    }

    #[tokio::test]
    async fn scanner_job_starts_stopped_when_disabled() {
        let db = crate::persistence::init_database("sqlite::memory:").await.unwrap();
        let (scheduler, _llm) = test_scheduler(db).await;
        assert!(!scheduler.core.settings_snapshot().proactive_scan_enabled);
        assert!(scheduler.scanner.lock().await.is_none());
    }

    #[tokio::test]
    async fn reschedule_toggles_scanner_task() {
        let db = crate::persistence::init_database("sqlite::memory:").await.unwrap();
        let (scheduler, _llm) = test_scheduler(db).await;

        let mut enabled = Settings::default();
        enabled.proactive_scan_enabled = true;
        scheduler.reschedule(enabled).await;
        assert!(scheduler.scanner_running.load(Ordering::SeqCst));
        assert!(scheduler.scanner.lock().await.is_some());

        let mut disabled = Settings::default();
        disabled.proactive_scan_enabled = false;
        scheduler.reschedule(disabled).await;
        assert!(!scheduler.scanner_running.load(Ordering::SeqCst));
        assert!(scheduler.scanner.lock().await.is_none());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn reschedule_reconfigures_llm_only_when_model_list_changes() {
        let db = crate::persistence::init_database("sqlite::memory:").await.unwrap();
        let (scheduler, llm) = test_scheduler(db).await;

        let same = Settings::default();
        scheduler.reschedule(same).await;
        assert_eq!(llm.reconfigure_calls.load(Ordering::SeqCst), 0);

        let mut changed = Settings::default();
        changed.gemini_model_fallback_order = vec!["gemini-1.5-pro".to_string()];
        scheduler.reschedule(changed).await;
        assert_eq!(llm.reconfigure_calls.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
    }
}
