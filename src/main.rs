//! Process bootstrap (SPEC_FULL.md §B): load environment, initialize
//! logging, build the `Core`, and run the `Scheduler`'s four jobs until the
//! process receives a shutdown signal.

use gemini_trading_agent::config::Settings;
use gemini_trading_agent::domain::repositories::exchange_client::ExchangeClient;
use gemini_trading_agent::domain::repositories::llm_client::LlmClient;
use gemini_trading_agent::domain::repositories::notifier::{NullNotifier, Notifier};
use gemini_trading_agent::infrastructure::exchange_adapter::{BinanceFuturesClient, BinanceFuturesConfig};
use gemini_trading_agent::infrastructure::llm_client::{GeminiClient, GeminiConfig};
use gemini_trading_agent::infrastructure::telegram_notifier::TelegramNotifier;
use gemini_trading_agent::persistence::{self, DatabaseConfig};
use gemini_trading_agent::trading::core::Core;
use gemini_trading_agent::trading::scheduler::Scheduler;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn build_exchange() -> Arc<dyn ExchangeClient> {
    let api_key = env_or("BINANCE_API_KEY", "");
    let api_secret = env_or("BINANCE_API_SECRET", "");
    let testnet = std::env::var("BINANCE_TESTNET")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    Arc::new(BinanceFuturesClient::new(BinanceFuturesConfig::new(&api_key, &api_secret, testnet)))
}

fn build_llm(settings: &Settings) -> Arc<dyn LlmClient> {
    let api_key = env_or("GEMINI_API_KEY", "");
    Arc::new(GeminiClient::new(GeminiConfig::new(&api_key), settings.llm_model_list()))
}

fn build_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    if !settings.telegram_enabled {
        return Arc::new(NullNotifier);
    }
    match (std::env::var("TELEGRAM_BOT_TOKEN"), std::env::var("TELEGRAM_CHAT_ID")) {
        (Ok(token), Ok(chat_id)) => Arc::new(TelegramNotifier::new(&token, &chat_id)),
        _ => {
            tracing::warn!("TELEGRAM_ENABLED is true but TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID are unset, notifications disabled");
            Arc::new(NullNotifier)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if dotenvy::dotenv().is_err() {
        eprintln!("no .env file found, continuing with process environment");
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_trading_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("trading agent starting up");

    let db_config = DatabaseConfig::from_env();
    let db = persistence::init_database_with_config(&db_config).await?;

    let settings = Settings::load(&db).await?;
    info!(
        live_trading = settings.live_trading,
        proactive_scan_enabled = settings.proactive_scan_enabled,
        "settings loaded"
    );

    let exchange = build_exchange();
    let llm = build_llm(&settings);
    let notifier = build_notifier(&settings);

    let core = Arc::new(Core::new(settings, exchange, llm, notifier, db));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&core)));
    scheduler.start().await;
    info!("scheduler started: position_sync, position_checker, orphan_order jobs running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutdown signal received, stopping scheduler");
    scheduler.shutdown().await;
    info!("trading agent stopped");

    Ok(())
}
